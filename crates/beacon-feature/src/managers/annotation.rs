//! Pod annotation accumulator

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::merge::{merge_text, MergePolicy};

/// Adds annotations to the pod template metadata
#[derive(Debug)]
pub struct AnnotationManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> AnnotationManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add an annotation; an existing value is kept
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.add_opt(key.into(), value.into(), None);
    }

    /// Add an annotation, resolving a collision with `policy`
    pub fn add_with_merge_policy(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        policy: MergePolicy,
    ) {
        self.add_opt(key.into(), value.into(), Some(policy));
    }

    fn add_opt(&mut self, key: String, value: String, policy: Option<MergePolicy>) {
        let annotations = self
            .template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(BTreeMap::new);
        match annotations.get_mut(&key) {
            Some(existing) => merge_text(existing, &value, policy, "annotation", &key, "pod"),
            None => {
                annotations.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation<'t>(template: &'t PodTemplateSpec, key: &str) -> Option<&'t String> {
        template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.as_ref())
            .and_then(|a| a.get(key))
    }

    #[test]
    fn test_add_creates_metadata() {
        let mut template = PodTemplateSpec::default();
        AnnotationManager::new(&mut template).add("checksum/ksm-custom-config", "abc");
        assert_eq!(
            annotation(&template, "checksum/ksm-custom-config"),
            Some(&"abc".to_string())
        );
    }

    #[test]
    fn test_collision_policies() {
        let mut template = PodTemplateSpec::default();
        let mut annotations = AnnotationManager::new(&mut template);
        annotations.add("k", "a");
        annotations.add("k", "b");
        annotations.add_with_merge_policy("k", "c", MergePolicy::AppendToValue);
        annotations.add_with_merge_policy("k", "d", MergePolicy::IgnoreNew);
        assert_eq!(annotation(&template, "k"), Some(&"a c".to_string()));

        AnnotationManager::new(&mut template).add_with_merge_policy("k", "e", MergePolicy::Override);
        assert_eq!(annotation(&template, "k"), Some(&"e".to_string()));
    }
}
