//! Requirement declarations and their merge algorithm
//!
//! Every feature answers "which deployables, and which of their containers,
//! do I need?" with a [`RequiredComponents`]. The driver folds those answers
//! together left to right in feature order.

use serde::Serialize;

use crate::component::{AgentContainerName, ComponentName};

/// Whether a feature needs a deployable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum Requirement {
    /// The feature has no opinion
    #[default]
    Unset,
    /// The feature needs the deployable
    Required,
    /// The feature must not run on the deployable, vetoing any `Required`
    Forbidden,
}

impl Requirement {
    /// Merge two requirements: `Forbidden` wins, `Unset` is the identity
    pub fn merge(self, other: Requirement) -> Requirement {
        match (self, other) {
            (Self::Forbidden, _) | (_, Self::Forbidden) => Self::Forbidden,
            (Self::Unset, other) => other,
            (this, Self::Unset) => this,
            (Self::Required, Self::Required) => Self::Required,
        }
    }

    /// `Some(true)` is Required, `Some(false)` Forbidden, `None` Unset
    pub fn from_flag(flag: Option<bool>) -> Requirement {
        match flag {
            Some(true) => Self::Required,
            Some(false) => Self::Forbidden,
            None => Self::Unset,
        }
    }
}

/// Requirement on one deployable
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequiredComponent {
    /// Tri-state requirement
    pub requirement: Requirement,
    /// Containers needed on the deployable, in first-declared order
    pub containers: Vec<AgentContainerName>,
}

impl RequiredComponent {
    /// Required with the given containers
    pub fn required(containers: impl IntoIterator<Item = AgentContainerName>) -> Self {
        Self {
            requirement: Requirement::Required,
            containers: containers.into_iter().collect(),
        }
    }

    /// Explicitly forbidden
    pub fn forbidden() -> Self {
        Self {
            requirement: Requirement::Forbidden,
            containers: Vec::new(),
        }
    }

    /// Requirement taken from an optional flag, without containers
    pub fn from_flag(flag: Option<bool>) -> Self {
        Self {
            requirement: Requirement::from_flag(flag),
            containers: Vec::new(),
        }
    }

    /// The deployable must be rendered.
    ///
    /// `Forbidden` is a veto, the same rule [`Requirement::merge`] applies:
    /// it disables the deployable even when containers were listed for it.
    pub fn is_enabled(&self) -> bool {
        match self.requirement {
            Requirement::Forbidden => false,
            Requirement::Required => true,
            Requirement::Unset => !self.containers.is_empty(),
        }
    }

    /// The feature expressed any opinion about the deployable
    pub fn is_configured(&self) -> bool {
        self.requirement != Requirement::Unset || !self.containers.is_empty()
    }

    /// Some container needs elevated host access
    pub fn is_privileged(&self) -> bool {
        self.containers.iter().any(AgentContainerName::is_privileged)
    }

    /// Containers were collapsed to the single unprivileged container
    pub fn single_container_strategy_enabled(&self) -> bool {
        self.containers == [AgentContainerName::UnprivilegedSingle]
    }

    /// Merge `other` into this requirement.
    ///
    /// Containers form an ordered union: this side first, then unseen
    /// entries of `other`. The result depends on argument order.
    pub fn merge(mut self, other: &RequiredComponent) -> RequiredComponent {
        self.requirement = self.requirement.merge(other.requirement);
        self.containers = union_containers(&self.containers, &other.containers);
        self
    }
}

fn union_containers(
    left: &[AgentContainerName],
    right: &[AgentContainerName],
) -> Vec<AgentContainerName> {
    let mut out = Vec::with_capacity(left.len() + right.len());
    for container in left.iter().chain(right) {
        if !out.contains(container) {
            out.push(*container);
        }
    }
    out
}

/// Requirements on every deployable
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredComponents {
    /// Control plane deployment
    pub cluster_agent: RequiredComponent,
    /// Per-node daemon
    pub node_agent: RequiredComponent,
    /// Cluster checks runner deployment
    pub checks_runner: RequiredComponent,
}

impl RequiredComponents {
    /// Any deployable is needed
    pub fn is_enabled(&self) -> bool {
        self.cluster_agent.is_enabled()
            || self.node_agent.is_enabled()
            || self.checks_runner.is_enabled()
    }

    /// Any deployable was given an opinion
    pub fn is_configured(&self) -> bool {
        self.cluster_agent.is_configured()
            || self.node_agent.is_configured()
            || self.checks_runner.is_configured()
    }

    /// Merge per deployable, with `self` as the left-hand side
    pub fn merge(self, other: &RequiredComponents) -> RequiredComponents {
        RequiredComponents {
            cluster_agent: self.cluster_agent.merge(&other.cluster_agent),
            node_agent: self.node_agent.merge(&other.node_agent),
            checks_runner: self.checks_runner.merge(&other.checks_runner),
        }
    }

    /// Requirement for one deployable
    pub fn get(&self, component: ComponentName) -> &RequiredComponent {
        match component {
            ComponentName::ClusterAgent => &self.cluster_agent,
            ComponentName::NodeAgent => &self.node_agent,
            ComponentName::ClusterChecksRunner => &self.checks_runner,
        }
    }

    /// Mutable requirement for one deployable
    pub fn get_mut(&mut self, component: ComponentName) -> &mut RequiredComponent {
        match component {
            ComponentName::ClusterAgent => &mut self.cluster_agent,
            ComponentName::NodeAgent => &mut self.node_agent,
            ComponentName::ClusterChecksRunner => &mut self.checks_runner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::component::AgentContainerName::{Core, Process, Security, SystemProbe, Trace};
    use super::Requirement::{Forbidden, Required, Unset};

    #[rstest]
    #[case(Unset, Unset, Unset)]
    #[case(Unset, Required, Required)]
    #[case(Unset, Forbidden, Forbidden)]
    #[case(Required, Unset, Required)]
    #[case(Required, Required, Required)]
    #[case(Required, Forbidden, Forbidden)]
    #[case(Forbidden, Unset, Forbidden)]
    #[case(Forbidden, Required, Forbidden)]
    #[case(Forbidden, Forbidden, Forbidden)]
    fn test_requirement_merge_table(
        #[case] left: Requirement,
        #[case] right: Requirement,
        #[case] expected: Requirement,
    ) {
        assert_eq!(left.merge(right), expected);
    }

    #[test]
    fn test_container_union_dedups_in_first_seen_order() {
        let left = RequiredComponent {
            requirement: Unset,
            containers: vec![Core, Core, Trace],
        };
        let right = RequiredComponent {
            requirement: Unset,
            containers: vec![Trace, Process],
        };
        assert_eq!(left.merge(&right).containers, vec![Core, Trace, Process]);
    }

    #[test]
    fn test_container_union_depends_on_argument_order() {
        let a = RequiredComponent::required([Core, Trace]);
        let b = RequiredComponent::required([Process, Core]);

        assert_eq!(a.clone().merge(&b).containers, vec![Core, Trace, Process]);
        assert_eq!(b.merge(&a).containers, vec![Process, Core, Trace]);
    }

    #[test]
    fn test_forbidden_vetoes_containers() {
        let merged = RequiredComponent::required([Core]).merge(&RequiredComponent::forbidden());
        assert_eq!(merged.requirement, Forbidden);
        assert_eq!(merged.containers, vec![Core]);
        assert!(!merged.is_enabled());
        assert!(merged.is_configured());
    }

    #[test]
    fn test_containers_alone_enable() {
        let rc = RequiredComponent {
            requirement: Unset,
            containers: vec![Core],
        };
        assert!(rc.is_enabled());
        assert!(!RequiredComponent::default().is_enabled());
        assert!(!RequiredComponent::default().is_configured());
    }

    #[test]
    fn test_privileged_detection() {
        assert!(RequiredComponent::required([Core, SystemProbe]).is_privileged());
        assert!(RequiredComponent::required([Security]).is_privileged());
        assert!(!RequiredComponent::required([Core, Trace]).is_privileged());
    }

    #[test]
    fn test_single_container_strategy_enabled() {
        let single = RequiredComponent::required([AgentContainerName::UnprivilegedSingle]);
        assert!(single.single_container_strategy_enabled());
        assert!(!RequiredComponent::required([Core]).single_container_strategy_enabled());
    }

    #[test]
    fn test_components_merge_per_deployable() {
        let left = RequiredComponents {
            cluster_agent: RequiredComponent::from_flag(Some(true)),
            node_agent: RequiredComponent::required([Core]),
            checks_runner: RequiredComponent::default(),
        };
        let right = RequiredComponents {
            checks_runner: RequiredComponent::forbidden(),
            node_agent: RequiredComponent::required([Trace]),
            ..Default::default()
        };

        let merged = left.merge(&right);
        assert!(merged.get(ComponentName::ClusterAgent).is_enabled());
        assert_eq!(merged.node_agent.containers, vec![Core, Trace]);
        assert_eq!(merged.checks_runner.requirement, Forbidden);
        assert!(merged.is_enabled());
    }
}
