//! Kubernetes state metrics collected by the cluster agent, optionally
//! dispatched to the checks runners

use std::collections::BTreeMap;

use k8s_openapi::api::rbac::v1::PolicyRule;

use beacon_common::crd::common::{ConfigMapConfig, KeyToPath};

use crate::checksum::{checksum_annotation_key, compute_checksum};
use crate::component::{AgentContainerName, ComponentName, ContainerTarget};
use crate::feature::{Feature, FeatureId, FeatureOptions};
use crate::input::AgentInput;
use crate::managers::{env_var, policy_rule, volume_mount, MergePolicy, PodTemplateManagers, ResourceManagers};
use crate::required::{RequiredComponent, RequiredComponents};
use crate::Result;

use super::{config_map_volume, CustomConfigSource};

/// Feature identifier
pub const ID: FeatureId = FeatureId::new("kubernetesStateCore");

/// Enable the check on the cluster agent
pub const ENABLED_ENV: &str = "BEACON_KUBE_STATE_METRICS_CORE_ENABLED";
/// ConfigMap holding the check configuration
pub const CONFIG_MAP_ENV: &str = "BEACON_KUBE_STATE_METRICS_CORE_CONFIGMAP_NAME";
/// Integrations node agents must not autoconfigure
pub const IGNORE_AUTOCONF_ENV: &str = "BEACON_IGNORE_AUTOCONF";

/// Key of the check configuration in the generated ConfigMap
pub const CONFIG_KEY: &str = "kubernetes_state_core.yaml.default";
/// Where the check configuration is mounted on the cluster agent
pub const CONFIG_MOUNT_PATH: &str = "/etc/beacon-agent/conf.d/kubernetes_state_core.d";

const CONFIG_VOLUME: &str = "ksm-core-config";

const COLLECTORS: &[&str] = &[
    "pods",
    "replicationcontrollers",
    "statefulsets",
    "nodes",
    "cronjobs",
    "jobs",
    "replicasets",
    "deployments",
    "configmaps",
    "services",
    "endpoints",
    "daemonsets",
    "horizontalpodautoscalers",
    "limitranges",
    "resourcequotas",
    "secrets",
    "namespaces",
    "persistentvolumeclaims",
    "persistentvolumes",
];

/// Construct the feature
pub fn build(_options: &FeatureOptions) -> Box<dyn Feature> {
    Box::<KubeStateCoreFeature>::default()
}

#[derive(Debug, Default)]
struct KubeStateCoreFeature {
    agent: String,
    namespace: String,
    run_in_runner: bool,
    config: Option<CustomConfigSource>,
}

impl KubeStateCoreFeature {
    /// Deployable whose service account holds the check's RBAC
    fn rbac_owner(&self) -> ComponentName {
        if self.run_in_runner {
            ComponentName::ClusterChecksRunner
        } else {
            ComponentName::ClusterAgent
        }
    }

    fn generated_config_map_name(&self) -> String {
        format!("{}-kube-state-metrics-core-config", self.agent)
    }

    fn default_config(&self) -> String {
        let mut conf = format!(
            "cluster_check: {}\ninit_config:\ninstances:\n  - skip_leader_election: {}\n    collectors:\n",
            self.run_in_runner, self.run_in_runner
        );
        for collector in COLLECTORS {
            conf.push_str("      - ");
            conf.push_str(collector);
            conf.push('\n');
        }
        conf
    }

    /// Content of the generated ConfigMap, `None` when the user brings one
    fn generated_data(&self) -> Option<BTreeMap<String, String>> {
        let conf = match &self.config {
            Some(CustomConfigSource::ConfigMap(_)) => return None,
            Some(CustomConfigSource::Inline(data)) => data.clone(),
            None => self.default_config(),
        };
        Some(BTreeMap::from([(CONFIG_KEY.to_string(), conf)]))
    }

    fn mounted_config_map(&self) -> ConfigMapConfig {
        match &self.config {
            Some(CustomConfigSource::ConfigMap(config_map)) => config_map.clone(),
            _ => ConfigMapConfig {
                name: self.generated_config_map_name(),
                items: vec![KeyToPath {
                    key: CONFIG_KEY.to_string(),
                    path: CONFIG_KEY.to_string(),
                }],
            },
        }
    }

    fn config_checksum(&self) -> Result<String> {
        match self.generated_data() {
            Some(data) => compute_checksum(&data),
            None => compute_checksum(&self.mounted_config_map()),
        }
    }

    fn ignore_autoconf(managers: &mut PodTemplateManagers<'_>, container: AgentContainerName) -> Result<()> {
        managers.env_var().add_with_merge_policy(
            ContainerTarget::from(container),
            env_var(IGNORE_AUTOCONF_ENV, "kubernetes_state"),
            MergePolicy::AppendToValue,
        )
    }
}

impl Feature for KubeStateCoreFeature {
    fn id(&self) -> FeatureId {
        ID
    }

    fn configure(&mut self, input: &AgentInput) -> Result<RequiredComponents> {
        let features = input.features();
        let ksm = features.kube_state_metrics_core.unwrap_or_default();
        if !ksm.enabled.unwrap_or(false) {
            return Ok(RequiredComponents::default());
        }
        self.agent = input.name.clone();
        self.namespace = input.namespace.clone();
        self.config = CustomConfigSource::resolve(ID, "conf", ksm.conf)?;

        let cluster_checks = features.cluster_checks.unwrap_or_default();
        self.run_in_runner = cluster_checks.enabled.unwrap_or(false)
            && cluster_checks.use_cluster_checks_runners.unwrap_or(false)
            && ksm.cluster_check.unwrap_or(true);

        let mut components = RequiredComponents {
            cluster_agent: RequiredComponent::required([AgentContainerName::ClusterAgent]),
            ..Default::default()
        };
        if self.run_in_runner {
            components.checks_runner = RequiredComponent::required([AgentContainerName::ClusterChecksRunner]);
        }
        Ok(components)
    }

    fn manage_dependencies(&self, managers: &mut ResourceManagers, _components: &RequiredComponents) -> Result<()> {
        if let Some(data) = self.generated_data() {
            managers.config_map().add_config_map(
                &self.generated_config_map_name(),
                &self.namespace,
                data,
                Some(&checksum_annotation_key(ID)),
            )?;
        }

        let owner = self.rbac_owner();
        let service_account = owner.object_name(&self.agent);
        let role = format!("{service_account}-kube-state-metrics-core");
        managers
            .rbac()
            .owned_by(owner)
            .add_cluster_policy_rules(&self.namespace, &role, &service_account, rbac_rules())
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers<'_>) -> Result<()> {
        let target = ContainerTarget::from(AgentContainerName::ClusterAgent);
        let config_map = self.mounted_config_map();

        let mut volumes = managers.volume();
        volumes.add_volume(config_map_volume(CONFIG_VOLUME, &config_map))?;
        volumes.add_volume_mount(target, volume_mount(CONFIG_VOLUME, CONFIG_MOUNT_PATH, true))?;

        let mut env = managers.env_var();
        env.add(target, env_var(ENABLED_ENV, "true"))?;
        env.add(target, env_var(CONFIG_MAP_ENV, config_map.name))?;

        managers
            .annotation()
            .add(checksum_annotation_key(ID), self.config_checksum()?);
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers<'_>, _provider: &str) -> Result<()> {
        Self::ignore_autoconf(managers, AgentContainerName::Core)
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers<'_>,
        _provider: &str,
    ) -> Result<()> {
        Self::ignore_autoconf(managers, AgentContainerName::UnprivilegedSingle)
    }
}

fn rbac_rules() -> Vec<PolicyRule> {
    let read = &["list", "watch"];
    vec![
        policy_rule(
            &[""],
            &[
                "configmaps",
                "endpoints",
                "events",
                "limitranges",
                "namespaces",
                "nodes",
                "persistentvolumeclaims",
                "persistentvolumes",
                "pods",
                "replicationcontrollers",
                "resourcequotas",
                "secrets",
                "services",
            ],
            read,
        ),
        policy_rule(&["apps"], &["daemonsets", "deployments", "replicasets", "statefulsets"], read),
        policy_rule(&["batch"], &["cronjobs", "jobs"], read),
        policy_rule(&["autoscaling"], &["horizontalpodautoscalers"], read),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::test_support::{annotation, env_value, input};
    use crate::managers::test_support::template_with;
    use crate::store::{Dependency, ObjectKind};

    fn configured(spec: &str) -> (KubeStateCoreFeature, RequiredComponents) {
        let mut feature = KubeStateCoreFeature::default();
        let components = feature.configure(&input(spec)).unwrap();
        (feature, components)
    }

    #[test]
    fn test_runs_on_cluster_agent_by_default() {
        let (feature, components) = configured("features:\n  kubeStateMetricsCore:\n    enabled: true\n");
        assert!(components.cluster_agent.is_enabled());
        assert!(!components.checks_runner.is_configured());

        let mut managers = ResourceManagers::new();
        feature.manage_dependencies(&mut managers, &components).unwrap();
        let store = managers.store();
        assert!(store
            .get(ObjectKind::ClusterRole, "", "beacon-cluster-agent-kube-state-metrics-core")
            .is_some());
        let Some(Dependency::ConfigMap(cm)) =
            store.get(ObjectKind::ConfigMap, "monitoring", "beacon-kube-state-metrics-core-config")
        else {
            panic!("expected generated ConfigMap");
        };
        let conf = &cm.data.as_ref().unwrap()[CONFIG_KEY];
        assert!(conf.starts_with("cluster_check: false\n"));
        assert!(conf.contains("      - deployments\n"));
        let cm_checksum = cm.metadata.annotations.as_ref().unwrap()[&checksum_annotation_key(ID)].clone();

        let mut template = template_with(&["cluster-agent"]);
        feature
            .manage_cluster_agent(&mut PodTemplateManagers::new(&mut template))
            .unwrap();
        assert_eq!(annotation(&template, &checksum_annotation_key(ID)), Some(cm_checksum));
        assert_eq!(
            env_value(&template, "cluster-agent", CONFIG_MAP_ENV).as_deref(),
            Some("beacon-kube-state-metrics-core-config")
        );
    }

    #[test]
    fn test_runners_take_the_check() {
        let (feature, components) = configured(
            r#"
features:
  clusterChecks:
    enabled: true
    useClusterChecksRunners: true
  kubeStateMetricsCore:
    enabled: true
"#,
        );
        assert!(components.checks_runner.is_enabled());

        let mut managers = ResourceManagers::new();
        feature.manage_dependencies(&mut managers, &components).unwrap();
        assert!(managers
            .store()
            .get(ObjectKind::ClusterRole, "", "beacon-cluster-checks-runner-kube-state-metrics-core")
            .is_some());
        let deleted = managers
            .rbac()
            .delete_by_component(ComponentName::ClusterChecksRunner, "monitoring")
            .unwrap();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn test_user_config_map_is_not_generated() {
        let (feature, components) = configured(
            r#"
features:
  kubeStateMetricsCore:
    enabled: true
    conf:
      configMap:
        name: my-ksm
"#,
        );
        let mut managers = ResourceManagers::new();
        feature.manage_dependencies(&mut managers, &components).unwrap();
        assert!(managers.store().get(ObjectKind::ConfigMap, "monitoring", "beacon-kube-state-metrics-core-config").is_none());

        let mut template = template_with(&["cluster-agent"]);
        feature
            .manage_cluster_agent(&mut PodTemplateManagers::new(&mut template))
            .unwrap();
        assert_eq!(env_value(&template, "cluster-agent", CONFIG_MAP_ENV).as_deref(), Some("my-ksm"));
    }

    #[test]
    fn test_node_agent_ignores_autoconf() {
        let (feature, _) = configured("features:\n  kubeStateMetricsCore:\n    enabled: true\n");
        let mut template = template_with(&["agent"]);
        let mut managers = PodTemplateManagers::new(&mut template);
        managers
            .env_var()
            .add(
                ContainerTarget::from(AgentContainerName::Core),
                env_var(IGNORE_AUTOCONF_ENV, "redis"),
            )
            .unwrap();
        feature.manage_node_agent(&mut managers, "default").unwrap();
        assert_eq!(
            env_value(&template, "agent", IGNORE_AUTOCONF_ENV).as_deref(),
            Some("redis kubernetes_state")
        );
    }
}
