//! Environment variable accumulator

use k8s_openapi::api::core::v1::{EnvVar, PodTemplateSpec};

use super::merge::{append_text, merge_entry, MergePolicy, Mergeable};
use super::target_containers;
use crate::component::ContainerTarget;
use crate::{FeatureError, Result};

impl Mergeable for EnvVar {
    const KIND: &'static str = "env var";

    fn merge_key(&self) -> String {
        self.name.clone()
    }

    fn append_value(&mut self, other: &Self) -> Result<()> {
        if self.value_from.is_some() || other.value_from.is_some() {
            return Err(FeatureError::merge(
                Self::KIND,
                &self.name,
                "cannot append to a value sourced from a reference",
            ));
        }
        let existing = self.value.as_deref().unwrap_or_default();
        let new = other.value.as_deref().unwrap_or_default();
        self.value = Some(append_text(existing, new));
        Ok(())
    }
}

/// Literal environment variable
pub fn env_var(name: impl Into<String>, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        value_from: None,
    }
}

/// Adds environment variables to the containers of a pod template
#[derive(Debug)]
pub struct EnvVarManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> EnvVarManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add a variable; an existing variable of the same name is kept
    pub fn add(&mut self, target: ContainerTarget, env: EnvVar) -> Result<()> {
        self.add_with_merge_policy_opt(target, env, None)
    }

    /// Add a variable, resolving a name collision with `policy`
    pub fn add_with_merge_policy(
        &mut self,
        target: ContainerTarget,
        env: EnvVar,
        policy: MergePolicy,
    ) -> Result<()> {
        self.add_with_merge_policy_opt(target, env, Some(policy))
    }

    fn add_with_merge_policy_opt(
        &mut self,
        target: ContainerTarget,
        env: EnvVar,
        policy: Option<MergePolicy>,
    ) -> Result<()> {
        for container in target_containers(self.template, target) {
            let scope = container.name.clone();
            let entries = container.env.get_or_insert_with(Vec::new);
            merge_entry(entries, env.clone(), policy, &scope)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::AgentContainerName;
    use crate::managers::test_support::{container, template_with};
    use k8s_openapi::api::core::v1::{EnvVarSource, ObjectFieldSelector};
    use rstest::rstest;

    fn values(template: &PodTemplateSpec, name: &str) -> Vec<(String, String)> {
        container(template, name)
            .env
            .iter()
            .flatten()
            .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
            .collect()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_add_to_named_container_preserves_order() {
        let mut template = template_with(&["agent", "trace-agent"]);
        let mut envs = EnvVarManager::new(&mut template);
        let core = ContainerTarget::from(AgentContainerName::Core);
        envs.add(core, env_var("B", "2")).unwrap();
        envs.add(core, env_var("A", "1")).unwrap();

        assert_eq!(values(&template, "agent"), pairs(&[("B", "2"), ("A", "1")]));
        assert!(values(&template, "trace-agent").is_empty());
    }

    #[test]
    fn test_add_to_all_containers() {
        let mut template = template_with(&["agent", "trace-agent"]);
        EnvVarManager::new(&mut template)
            .add(ContainerTarget::All, env_var("SITE", "beacon.dev"))
            .unwrap();

        assert_eq!(values(&template, "agent"), pairs(&[("SITE", "beacon.dev")]));
        assert_eq!(
            values(&template, "trace-agent"),
            pairs(&[("SITE", "beacon.dev")])
        );
    }

    #[test]
    fn test_missing_container_is_noop() {
        let mut template = template_with(&["agent"]);
        EnvVarManager::new(&mut template)
            .add(
                AgentContainerName::SystemProbe.into(),
                env_var("X", "1"),
            )
            .unwrap();
        assert!(values(&template, "agent").is_empty());
    }

    #[rstest]
    #[case(MergePolicy::IgnoreNew, "first")]
    #[case(MergePolicy::AppendToValue, "first second")]
    #[case(MergePolicy::Override, "second")]
    fn test_collision_policy(#[case] policy: MergePolicy, #[case] expected: &str) {
        let mut template = template_with(&["agent"]);
        let mut envs = EnvVarManager::new(&mut template);
        let core = ContainerTarget::from(AgentContainerName::Core);
        envs.add(core, env_var("PROVIDERS", "first")).unwrap();
        envs.add_with_merge_policy(core, env_var("PROVIDERS", "second"), policy)
            .unwrap();

        assert_eq!(values(&template, "agent"), pairs(&[("PROVIDERS", expected)]));
    }

    #[test]
    fn test_default_collision_keeps_first_writer() {
        let mut template = template_with(&["agent"]);
        let mut envs = EnvVarManager::new(&mut template);
        envs.add(ContainerTarget::All, env_var("LEVEL", "info")).unwrap();
        envs.add(ContainerTarget::All, env_var("LEVEL", "debug")).unwrap();
        assert_eq!(values(&template, "agent"), pairs(&[("LEVEL", "info")]));
    }

    #[test]
    fn test_append_to_reference_value_errors() {
        let mut template = template_with(&["agent"]);
        let mut envs = EnvVarManager::new(&mut template);
        envs.add(
            ContainerTarget::All,
            EnvVar {
                name: "HOST".to_string(),
                value: None,
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        api_version: None,
                        field_path: "status.hostIP".to_string(),
                    }),
                    ..Default::default()
                }),
            },
        )
        .unwrap();

        let err = envs
            .add_with_merge_policy(
                ContainerTarget::All,
                env_var("HOST", "x"),
                MergePolicy::AppendToValue,
            )
            .unwrap_err();
        assert!(matches!(err, FeatureError::Merge { kind: "env var", .. }));
    }
}
