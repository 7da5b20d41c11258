//! Container and pod log collection on the node agent

use beacon_common::crd::v2alpha1::DEFAULT_LOG_OPEN_FILES_LIMIT;

use crate::component::{AgentContainerName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, host_path_volume, volume_mount, PodTemplateManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::{FeatureError, Result};

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("logCollection");

/// Enable log collection
pub const ENABLED_ENV: &str = "BEACON_LOGS_ENABLED";
/// Collect every container without annotations
pub const CONTAINER_COLLECT_ALL_ENV: &str = "BEACON_LOGS_CONFIG_CONTAINER_COLLECT_ALL";
/// Tail files instead of the runtime socket
pub const COLLECT_USING_FILES_ENV: &str = "BEACON_LOGS_CONFIG_K8S_CONTAINER_USE_FILE";
/// Maximum concurrently tailed files
pub const OPEN_FILES_LIMIT_ENV: &str = "BEACON_LOGS_CONFIG_OPEN_FILES_LIMIT";

/// Host directory for log pointers
pub const DEFAULT_TEMP_STORAGE_PATH: &str = "/var/lib/beacon-agent/logs";
/// Where pointers are mounted in the container
pub const POINTER_LOCAL_PATH: &str = "/opt/beacon-agent/run";
/// Host directory of pod logs
pub const DEFAULT_POD_LOG_PATH: &str = "/var/log/pods";
/// Host directory of container runtime logs
pub const DEFAULT_CONTAINER_LOG_PATH: &str = "/var/lib/docker/containers";
/// Host directory of container log symlinks
pub const DEFAULT_CONTAINER_SYMLINKS_PATH: &str = "/var/log/containers";

/// Construct the feature
pub fn build(_options: &FeatureOptions) -> Box<dyn Feature> {
    Box::<LogCollectionFeature>::default()
}

#[derive(Debug, Default)]
struct LogCollectionFeature {
    container_collect_all: bool,
    collect_using_files: bool,
    temp_storage_path: String,
    pod_log_path: String,
    container_log_path: String,
    container_symlinks_path: String,
    open_files_limit: i32,
}

impl LogCollectionFeature {
    fn apply(&self, managers: &mut PodTemplateManagers<'_>, container: AgentContainerName) -> Result<()> {
        let target = ContainerTarget::from(container);

        let mut volumes = managers.volume();
        volumes.add_volume_and_mount(
            target,
            host_path_volume("pointerdir", self.temp_storage_path.clone()),
            volume_mount("pointerdir", POINTER_LOCAL_PATH, false),
        )?;
        for (name, path) in [
            ("logpodpath", &self.pod_log_path),
            ("logcontainerpath", &self.container_log_path),
            ("symlinkcontainerpath", &self.container_symlinks_path),
        ] {
            volumes.add_volume_and_mount(
                target,
                host_path_volume(name, path.clone()),
                volume_mount(name, path.clone(), true),
            )?;
        }

        let mut env = managers.env_var();
        env.add(target, env_var(ENABLED_ENV, "true"))?;
        env.add(
            target,
            env_var(CONTAINER_COLLECT_ALL_ENV, self.container_collect_all.to_string()),
        )?;
        env.add(
            target,
            env_var(COLLECT_USING_FILES_ENV, self.collect_using_files.to_string()),
        )?;
        env.add(
            target,
            env_var(OPEN_FILES_LIMIT_ENV, self.open_files_limit.to_string()),
        )
    }
}

impl Feature for LogCollectionFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let logs = input.features().log_collection.unwrap_or_default();
        if !logs.enabled.unwrap_or(false) {
            return Ok(RequiredComponents::default());
        }

        self.container_collect_all = logs.container_collect_all.unwrap_or(false);
        self.collect_using_files = logs.container_collect_using_files.unwrap_or(true);
        self.temp_storage_path = logs
            .temp_storage_path
            .unwrap_or_else(|| DEFAULT_TEMP_STORAGE_PATH.to_string());
        self.pod_log_path = logs
            .pod_log_path
            .unwrap_or_else(|| DEFAULT_POD_LOG_PATH.to_string());
        self.container_log_path = logs
            .container_log_path
            .unwrap_or_else(|| DEFAULT_CONTAINER_LOG_PATH.to_string());
        self.container_symlinks_path = logs
            .container_symlinks_path
            .unwrap_or_else(|| DEFAULT_CONTAINER_SYMLINKS_PATH.to_string());
        self.open_files_limit = logs.open_files_limit.unwrap_or(DEFAULT_LOG_OPEN_FILES_LIMIT);
        if self.open_files_limit < 1 {
            return Err(FeatureError::invalid_spec(
                ID,
                format!("openFilesLimit must be positive, got {}", self.open_files_limit),
            ));
        }

        Ok(RequiredComponents {
            node_agent: RequiredComponent::required([AgentContainerName::Core]),
            ..Default::default()
        })
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        self.apply(managers, AgentContainerName::Core)
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        self.apply(managers, AgentContainerName::UnprivilegedSingle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{env_value, input};
    use crate::managers::test_support::{container, template_with};

    fn rendered(spec: &str) -> k8s_openapi::api::core::v1::PodTemplateSpec {
        let mut feature = LogCollectionFeature::default();
        feature.configure(&input(spec)).unwrap();
        let mut template = template_with(&["agent"]);
        feature
            .manage_node_agent(&mut PodTemplateManagers::new(&mut template), "default")
            .unwrap();
        template
    }

    #[test]
    fn test_disabled_requires_nothing() {
        let components = LogCollectionFeature::default()
            .configure(&input("features:\n  logCollection:\n    enabled: false\n"))
            .unwrap();
        assert!(!components.is_configured());
    }

    #[test]
    fn test_defaults() {
        let template = rendered("features:\n  logCollection:\n    enabled: true\n");
        assert_eq!(env_value(&template, "agent", OPEN_FILES_LIMIT_ENV).as_deref(), Some("100"));
        assert_eq!(env_value(&template, "agent", COLLECT_USING_FILES_ENV).as_deref(), Some("true"));
        assert_eq!(
            env_value(&template, "agent", CONTAINER_COLLECT_ALL_ENV).as_deref(),
            Some("false")
        );

        let mounts: Vec<_> = container(&template, "agent")
            .volume_mounts
            .iter()
            .flatten()
            .map(|m| m.mount_path.as_str())
            .collect();
        assert_eq!(
            mounts,
            vec![
                POINTER_LOCAL_PATH,
                DEFAULT_POD_LOG_PATH,
                DEFAULT_CONTAINER_LOG_PATH,
                DEFAULT_CONTAINER_SYMLINKS_PATH,
            ]
        );
    }

    #[test]
    fn test_custom_paths() {
        let template = rendered(
            r#"
features:
  logCollection:
    enabled: true
    containerCollectAll: true
    podLogPath: /custom/pods
    openFilesLimit: 500
"#,
        );
        assert_eq!(env_value(&template, "agent", OPEN_FILES_LIMIT_ENV).as_deref(), Some("500"));
        assert_eq!(
            env_value(&template, "agent", CONTAINER_COLLECT_ALL_ENV).as_deref(),
            Some("true")
        );
        let volumes = template.spec.as_ref().unwrap().volumes.as_ref().unwrap();
        let pods = volumes.iter().find(|v| v.name == "logpodpath").unwrap();
        assert_eq!(pods.host_path.as_ref().unwrap().path, "/custom/pods");
    }

    #[test]
    fn test_non_positive_open_files_limit() {
        let err = LogCollectionFeature::default()
            .configure(&input(
                "features:\n  logCollection:\n    enabled: true\n    openFilesLimit: 0\n",
            ))
            .unwrap_err();
        assert!(matches!(err, FeatureError::InvalidSpec { .. }));
    }
}
