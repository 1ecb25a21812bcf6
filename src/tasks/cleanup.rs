use k8s_openapi::api::{
    batch::v1::Job,
    core::v1::{PersistentVolume, PersistentVolumeClaim},
    rbac::v1::ClusterRoleBinding,
    storage::v1::StorageClass,
};
use kube::{api::ListParams, ResourceExt as _};
use snafu::ResultExt as _;
use tracing::{debug, info, instrument, warn};

use super::{bound_volume, claim_ref, remove_claim, remove_volume, volume_storage_class, VolumePhase};
use crate::{cluster::Cluster, config::Settings, KubeSnafu, Result};

/// What a sweep removed, as `kind/namespace/name` entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub removed: Vec<String>,
}

impl CleanupSummary {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    fn record(&mut self, deleted: bool, kind: &str, name: String) {
        if deleted {
            info!("Deleted {kind} {name}");
            self.removed.push(format!("{kind}/{name}"));
        } else {
            debug!("{kind} {name} already gone");
        }
    }
}

async fn sweep_namespace(
    cluster: &impl Cluster, settings: &Settings, namespace: &str, summary: &mut CleanupSummary,
) -> Result<()> {
    let app = &settings.app;
    let claim_name = app.claim_name.as_str();

    for job in [&app.backup_job_name, &app.restore_job_name] {
        let existing = cluster
            .get::<Job>(namespace, job)
            .await
            .with_context(|_| KubeSnafu { msg: format!("Failed to read job {namespace}/{job}") })?;
        if existing.is_none() {
            debug!(namespace, job = %job, "No job to delete");
            continue;
        }

        let deleted = cluster
            .delete::<Job>(namespace, job)
            .await
            .with_context(|_| KubeSnafu { msg: format!("Failed to delete job {namespace}/{job}") })?;
        summary.record(deleted, "job", format!("{namespace}/{job}"));
    }

    let claim = cluster.get::<PersistentVolumeClaim>(namespace, claim_name).await.with_context(
        |_| KubeSnafu { msg: format!("Failed to read claim {namespace}/{claim_name}") },
    )?;
    let Some(claim) = claim else {
        debug!(namespace, claim = claim_name, "No claim to delete");
        return Ok(());
    };

    let deleted = remove_claim(cluster, namespace, claim_name).await?;
    summary.record(deleted, "claim", format!("{namespace}/{claim_name}"));

    if let Some(volume) = bound_volume(&claim) {
        let deleted = remove_volume(cluster, volume).await?;
        summary.record(deleted, "volume", volume.to_string());
    }

    Ok(())
}

/// Volumes still pointing at the migration claim in either namespace after their claim is gone,
/// which happens when a run stops between deleting the source claim and re-binding.
async fn sweep_orphaned_volumes(
    cluster: &impl Cluster, settings: &Settings, summary: &mut CleanupSummary,
) -> Result<()> {
    let claim_name = settings.app.claim_name.as_str();
    let namespaces = [settings.source_namespace.as_str(), settings.target_namespace.as_str()];

    let volumes = cluster
        .list_global::<PersistentVolume>(&ListParams::default())
        .await
        .with_context(|_| KubeSnafu { msg: "Failed to list persistent volumes" })?;

    for pv in &volumes {
        let name = pv.name_any();
        match claim_ref(pv) {
            Some((ns, claim)) if claim == claim_name && namespaces.contains(&ns) => {
                let deleted = remove_volume(cluster, &name).await?;
                summary.record(deleted, "volume", name);
            }
            None if volume_storage_class(pv) == Some(settings.app.backup_storage_class.as_str())
                && VolumePhase::of(pv) == Some(VolumePhase::Available) =>
            {
                warn!(volume = %name, "Unclaimed backup volume left in place, remove it by hand once its data is not needed");
            }
            _ => {}
        }
    }

    Ok(())
}

/// Remove everything a migration creates, in both namespaces. Absent resources are skipped, so
/// this can run before a migration, after one, or after one failed half way.
#[instrument(skip_all, fields(source = %settings.source_namespace, target = %settings.target_namespace))]
pub async fn cleanup(cluster: &impl Cluster, settings: &Settings) -> Result<CleanupSummary> {
    let mut summary = CleanupSummary::default();

    for namespace in [&settings.source_namespace, &settings.target_namespace] {
        sweep_namespace(cluster, settings, namespace, &mut summary).await?;
    }
    sweep_orphaned_volumes(cluster, settings, &mut summary).await?;

    let binding = settings.app.role_binding_name.as_str();
    let existing = cluster.get_global::<ClusterRoleBinding>(binding).await.with_context(|_| {
        KubeSnafu { msg: format!("Failed to read cluster role binding {binding}") }
    })?;
    if existing.is_some() {
        let deleted = cluster.delete_global::<ClusterRoleBinding>(binding).await.with_context(
            |_| KubeSnafu { msg: format!("Failed to delete cluster role binding {binding}") },
        )?;
        summary.record(deleted, "clusterrolebinding", binding.to_string());
    }

    let storage_class = settings.app.backup_storage_class.as_str();
    let existing = cluster.get_global::<StorageClass>(storage_class).await.with_context(|_| {
        KubeSnafu { msg: format!("Failed to read storage class {storage_class}") }
    })?;
    if existing.is_some() {
        let deleted = cluster.delete_global::<StorageClass>(storage_class).await.with_context(
            |_| KubeSnafu { msg: format!("Failed to delete storage class {storage_class}") },
        )?;
        summary.record(deleted, "storageclass", storage_class.to_string());
    }

    if summary.is_empty() {
        info!("Nothing to clean up");
    } else {
        info!(removed = summary.removed.len(), "Cleanup finished");
    }
    Ok(summary)
}
