//! Render command

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use tracing::debug;

use beacon_common::yaml::parse_yaml;
use beacon_feature::{render, AgentInput, FeatureOptions, FeatureRegistry, RenderOptions};

use super::{write_output, OutputFormat};
use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// BeaconAgent manifest to render, `-` reads stdin
    pub file: PathBuf,

    /// Output format (yaml or json)
    #[arg(short, long, env = "BEACON_OUTPUT", default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,

    /// Node provider label handed to node agent features
    #[arg(long, env = "BEACON_PROVIDER", default_value = "default")]
    pub provider: String,

    /// Run process checks inside the core agent
    #[arg(long)]
    pub process_checks_in_core_agent: bool,

    /// Allow Cilium network policies
    #[arg(long)]
    pub support_cilium: bool,
}

impl RenderArgs {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            provider: self.provider.clone(),
            features: FeatureOptions {
                process_checks_in_core_agent: self.process_checks_in_core_agent,
                support_cilium: self.support_cilium,
            },
        }
    }
}

fn read_manifest(path: &Path) -> Result<String> {
    let contents = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map(|_| buf)
    } else {
        std::fs::read_to_string(path)
    };
    contents.map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Render a manifest already loaded into memory
pub fn render_manifest(manifest: &str, args: &RenderArgs, out: &mut impl Write) -> Result<()> {
    let input = AgentInput::from_manifest(parse_yaml(manifest)?)?;
    let registry = FeatureRegistry::with_builtin_features()?;
    debug!(features = registry.len(), agent = %input.name, "rendering");

    let rendered = render(&registry, &input, &args.options())?;
    write_output(&rendered, args.output, out)
}

pub fn run(args: RenderArgs, out: &mut impl Write) -> Result<()> {
    let manifest = read_manifest(&args.file)?;
    render_manifest(&manifest, &args, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: beacon.dev/v2alpha1
kind: BeaconAgent
metadata:
  name: beacon
  namespace: monitoring
spec:
  features:
    logCollection:
      enabled: true
    clusterChecks:
      enabled: true
      useClusterChecksRunners: true
"#;

    fn args(output: OutputFormat) -> RenderArgs {
        RenderArgs {
            file: PathBuf::from("-"),
            output,
            provider: "default".to_string(),
            process_checks_in_core_agent: false,
            support_cilium: false,
        }
    }

    fn rendered(output: OutputFormat) -> String {
        let mut out = Vec::new();
        render_manifest(MANIFEST, &args(output), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_render_yaml() {
        let text = rendered(OutputFormat::Yaml);
        assert!(text.contains("nodeAgent:"));
        assert!(text.contains("clusterAgent:"));
        assert!(text.contains("checksRunner:"));
        assert!(text.contains("BEACON_LOGS_ENABLED"));
    }

    #[test]
    fn test_render_json_parses() {
        let text = rendered(OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("nodeAgent").is_some());
        assert!(value["dependencies"].is_array());
    }

    #[test]
    fn test_render_is_stable() {
        assert_eq!(rendered(OutputFormat::Yaml), rendered(OutputFormat::Yaml));
    }

    #[test]
    fn test_unknown_api_version_fails() {
        let mut out = Vec::new();
        let err = render_manifest(
            "apiVersion: beacon.dev/v9\nkind: BeaconAgent\nmetadata:\n  name: x\nspec: {}\n",
            &args(OutputFormat::Yaml),
            &mut out,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unsupported apiVersion"));
        assert!(out.is_empty());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let mut out = Vec::new();
        let mut missing = args(OutputFormat::Yaml);
        missing.file = PathBuf::from("/nonexistent/agent.yaml");
        let err = run(missing, &mut out).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/agent.yaml"));
    }
}
