//! CLI commands

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde::Serialize;

use crate::{Error, Result};

pub mod crd;
pub mod features;
pub mod render;

/// Serialization used for command output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(Error::UnknownOutput(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => f.write_str("yaml"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Write `value` to `out` in the requested format
pub fn write_output<T: Serialize>(value: &T, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    match format {
        OutputFormat::Yaml => out.write_all(serde_yaml::to_string(value)?.as_bytes())?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, value)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("YAML".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert_eq!("yml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "toml".parse::<OutputFormat>(),
            Err(Error::UnknownOutput(_))
        ));
    }

    #[test]
    fn test_write_json_ends_with_newline() {
        let mut out = Vec::new();
        write_output(&serde_json::json!({"a": 1}), OutputFormat::Json, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("\"a\": 1"));
    }
}
