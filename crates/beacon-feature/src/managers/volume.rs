//! Volume and volume mount accumulator
//!
//! Volumes collide on name, mounts on mount path. Neither has a textual
//! value, so append-to-value is rejected for both.

use k8s_openapi::api::core::v1::{HostPathVolumeSource, PodTemplateSpec, Volume, VolumeMount};

use super::merge::{merge_entry, MergePolicy, Mergeable};
use super::{pod_spec, target_containers};
use crate::component::ContainerTarget;
use crate::Result;

impl Mergeable for Volume {
    const KIND: &'static str = "volume";

    fn merge_key(&self) -> String {
        self.name.clone()
    }
}

impl Mergeable for VolumeMount {
    const KIND: &'static str = "volume mount";

    fn merge_key(&self) -> String {
        self.mount_path.clone()
    }
}

/// Host path volume
pub fn host_path_volume(name: impl Into<String>, path: impl Into<String>) -> Volume {
    Volume {
        name: name.into(),
        host_path: Some(HostPathVolumeSource {
            path: path.into(),
            type_: None,
        }),
        ..Default::default()
    }
}

/// Mount of volume `name` at `path`
pub fn volume_mount(name: impl Into<String>, path: impl Into<String>, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.into(),
        mount_path: path.into(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

/// Adds pod volumes and container mounts
#[derive(Debug)]
pub struct VolumeManager<'a> {
    template: &'a mut PodTemplateSpec,
}

impl<'a> VolumeManager<'a> {
    pub(crate) fn new(template: &'a mut PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Add a pod volume; an existing volume of the same name is kept
    pub fn add_volume(&mut self, volume: Volume) -> Result<()> {
        self.add_volume_opt(volume, None)
    }

    /// Add a pod volume, resolving a name collision with `policy`
    pub fn add_volume_with_merge_policy(&mut self, volume: Volume, policy: MergePolicy) -> Result<()> {
        self.add_volume_opt(volume, Some(policy))
    }

    /// Mount into the target containers; an existing mount at the same
    /// path is kept
    pub fn add_volume_mount(&mut self, target: ContainerTarget, mount: VolumeMount) -> Result<()> {
        self.add_mount_opt(target, mount, None)
    }

    /// Mount into the target containers, resolving a path collision with
    /// `policy`
    pub fn add_volume_mount_with_merge_policy(
        &mut self,
        target: ContainerTarget,
        mount: VolumeMount,
        policy: MergePolicy,
    ) -> Result<()> {
        self.add_mount_opt(target, mount, Some(policy))
    }

    /// Add a volume and mount it into the target containers
    pub fn add_volume_and_mount(
        &mut self,
        target: ContainerTarget,
        volume: Volume,
        mount: VolumeMount,
    ) -> Result<()> {
        self.add_volume(volume)?;
        self.add_volume_mount(target, mount)
    }

    fn add_volume_opt(&mut self, volume: Volume, policy: Option<MergePolicy>) -> Result<()> {
        let volumes = pod_spec(self.template).volumes.get_or_insert_with(Vec::new);
        merge_entry(volumes, volume, policy, "pod")
    }

    fn add_mount_opt(
        &mut self,
        target: ContainerTarget,
        mount: VolumeMount,
        policy: Option<MergePolicy>,
    ) -> Result<()> {
        for container in target_containers(self.template, target) {
            let scope = container.name.clone();
            let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
            merge_entry(mounts, mount.clone(), policy, &scope)?;
        }
        Ok(())
    }
}
