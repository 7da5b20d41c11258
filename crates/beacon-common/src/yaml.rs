//! YAML input handling
//!
//! BeaconAgent manifests arrive as YAML. They are parsed with yaml-rust2 into
//! `serde_json::Value` and then deserialized into the typed CRD for whichever
//! schema generation the document declares.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

use crate::{Error, Result};

const YAML_KIND: &str = "yaml";

/// Parse a YAML string into a `serde_json::Value`.
///
/// Only the first document is returned; empty input yields `Value::Null`.
pub fn parse_yaml(input: &str) -> Result<Value> {
    let docs = YamlLoader::load_from_str(input)
        .map_err(|e| Error::serialization_for_kind(YAML_KIND, e.to_string()))?;
    docs.into_iter()
        .next()
        .map_or(Ok(Value::Null), yaml_to_json)
}

/// Parse the first YAML document directly into a typed value
pub fn from_yaml<T: DeserializeOwned>(input: &str) -> Result<T> {
    let value = parse_yaml(input)?;
    serde_json::from_value(value).map_err(Error::from)
}

/// Read the `apiVersion` field of a parsed manifest
pub fn api_version_of(value: &Value) -> Option<&str> {
    value.get("apiVersion").and_then(Value::as_str)
}

fn yaml_to_json(yaml: Yaml) -> Result<Value> {
    let value = match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| Error::serialization(e.to_string()))?;
            Number::from_f64(f).map_or(Value::Null, Value::Number)
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Hash(entries) => {
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(yaml_key(k)?, yaml_to_json(v)?);
            }
            Value::Object(map)
        }
        Yaml::Alias(_) => {
            return Err(Error::serialization_for_kind(
                YAML_KIND,
                "YAML aliases are not supported",
            ))
        }
        Yaml::BadValue => return Err(Error::serialization_for_kind(YAML_KIND, "bad YAML value")),
    };
    Ok(value)
}

fn yaml_key(key: Yaml) -> Result<String> {
    match key {
        Yaml::String(s) | Yaml::Real(s) => Ok(s),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        Yaml::Null => Ok("null".to_string()),
        _ => Err(Error::serialization_for_kind(
            YAML_KIND,
            "unsupported YAML key type",
        )),
    }
}
