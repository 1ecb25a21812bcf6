use std::{fmt::Display, str::FromStr};

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use serde_json::json;
use snafu::ResultExt as _;
use tracing::{debug, warn};

use crate::{
    cluster::{is_conflict, is_not_found, Cluster},
    KubeSnafu, Result,
};

pub mod backup;
pub mod cleanup;
pub mod job;
pub mod restore;
pub mod storage;
pub mod transfer;

/// `.status.phase` of a PersistentVolume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumePhase {
    Pending,
    Available,
    Bound,
    Released,
    Failed,
}

impl VolumePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Available => "Available",
            Self::Bound => "Bound",
            Self::Released => "Released",
            Self::Failed => "Failed",
        }
    }

    pub fn of(pv: &PersistentVolume) -> Option<Self> {
        pv.status.as_ref()?.phase.as_deref()?.parse().ok()
    }
}

impl Display for VolumePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VolumePhase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Available" => Ok(Self::Available),
            "Bound" => Ok(Self::Bound),
            "Released" => Ok(Self::Released),
            "Failed" => Ok(Self::Failed),
            x => Err(format!("Unknown volume phase {x}")),
        }
    }
}

/// Namespace and name of the claim a volume points at.
pub(crate) fn claim_ref(pv: &PersistentVolume) -> Option<(&str, &str)> {
    let claim_ref = pv.spec.as_ref()?.claim_ref.as_ref()?;
    Some((claim_ref.namespace.as_deref()?, claim_ref.name.as_deref()?))
}

pub(crate) fn volume_storage_class(pv: &PersistentVolume) -> Option<&str> {
    pv.spec.as_ref()?.storage_class_name.as_deref()
}

pub(crate) fn bound_volume(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec.as_ref()?.volume_name.as_deref().filter(|x| !x.is_empty())
}

pub(crate) fn claim_storage_class(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec.as_ref()?.storage_class_name.as_deref()
}

fn clear_finalizers_patch() -> serde_json::Value {
    json!({ "metadata": { "finalizers": null } })
}

async fn clear_claim_finalizers(cluster: &impl Cluster, namespace: &str, name: &str) -> Result<()> {
    match cluster.patch::<PersistentVolumeClaim>(namespace, name, &clear_finalizers_patch()).await
    {
        Ok(_) => Ok(()),
        Err(err) if is_not_found(&err) => Ok(()),
        Err(err) => Err(err).with_context(|_| KubeSnafu {
            msg: format!("Failed to clear finalizers of claim {namespace}/{name}"),
        }),
    }
}

/// Clear a claim's finalizers, then delete it. Returns whether a claim was deleted.
///
/// The finalizers are cleared first because the storage layer protects claims in use; if the
/// deletion is still rejected the finalizers are cleared once more and the deletion retried.
pub(crate) async fn remove_claim(cluster: &impl Cluster, namespace: &str, name: &str) -> Result<bool> {
    clear_claim_finalizers(cluster, namespace, name).await?;

    let deleted = match cluster.delete::<PersistentVolumeClaim>(namespace, name).await {
        Err(err) if is_conflict(&err) => {
            warn!(namespace, claim = name, "Claim deletion rejected, clearing finalizers again");
            clear_claim_finalizers(cluster, namespace, name).await?;
            cluster.delete::<PersistentVolumeClaim>(namespace, name).await
        }
        result => result,
    }
    .with_context(|_| KubeSnafu { msg: format!("Failed to delete claim {namespace}/{name}") })?;

    debug!(namespace, claim = name, deleted, "Removed claim");
    Ok(deleted)
}

/// Clear a volume's finalizers, then delete it. Returns whether a volume was deleted.
pub(crate) async fn remove_volume(cluster: &impl Cluster, name: &str) -> Result<bool> {
    match cluster.patch_global::<PersistentVolume>(name, &clear_finalizers_patch()).await {
        Ok(_) => {}
        Err(err) if is_not_found(&err) => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|_| KubeSnafu {
                msg: format!("Failed to clear finalizers of volume {name}"),
            })
        }
    }

    let deleted = cluster
        .delete_global::<PersistentVolume>(name)
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to delete volume {name}") })?;

    debug!(volume = name, deleted, "Removed volume");
    Ok(deleted)
}
