//! Types shared by both BeaconAgent schema generations

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration supplied either inline or by reference to a ConfigMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CustomConfig {
    /// Inline configuration content (YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_data: Option<String>,

    /// Reference to an existing ConfigMap holding the configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapConfig>,
}

/// Reference to a user-managed ConfigMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapConfig {
    /// ConfigMap name
    pub name: String,

    /// Keys to project into the mounted volume
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<KeyToPath>,
}

/// Projection of one ConfigMap key onto a file path
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KeyToPath {
    /// ConfigMap key
    pub key: String,
    /// Relative file path
    pub path: String,
}

/// Which network policy API to generate
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NetworkPolicyFlavor {
    /// networking.k8s.io/v1 NetworkPolicy
    #[default]
    Kubernetes,
    /// CiliumNetworkPolicy
    Cilium,
}

impl std::fmt::Display for NetworkPolicyFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kubernetes => write!(f, "kubernetes"),
            Self::Cilium => write!(f, "cilium"),
        }
    }
}

/// Observed state shared by both schema generations
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BeaconAgentStatus {
    /// Summary phase (e.g. "Running", "Failed")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Human-readable message for the phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the spec last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Network policy generation settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyConfig {
    /// Whether to create network policies for the agents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<bool>,

    /// Policy flavor (defaults to kubernetes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<NetworkPolicyFlavor>,
}

impl NetworkPolicyConfig {
    /// Flavor to generate, or `None` when policies are not requested
    pub fn enabled_flavor(&self) -> Option<NetworkPolicyFlavor> {
        if self.create.unwrap_or(false) {
            Some(self.flavor.unwrap_or_default())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_policy_disabled_by_default() {
        assert_eq!(NetworkPolicyConfig::default().enabled_flavor(), None);
    }

    #[test]
    fn test_network_policy_flavor_defaults_to_kubernetes() {
        let config = NetworkPolicyConfig {
            create: Some(true),
            flavor: None,
        };
        assert_eq!(
            config.enabled_flavor(),
            Some(NetworkPolicyFlavor::Kubernetes)
        );
    }

    #[test]
    fn test_custom_config_roundtrip_camel_case() {
        let config = CustomConfig {
            config_data: None,
            config_map: Some(ConfigMapConfig {
                name: "ksm-conf".to_string(),
                items: vec![KeyToPath {
                    key: "ksm.yaml".to_string(),
                    path: "ksm.yaml".to_string(),
                }],
            }),
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["configMap"]["name"], "ksm-conf");
        assert!(json.get("configData").is_none());
    }
}
