//! Moving the backup volume from the source namespace's claim to a new claim in the target
//! namespace.
//!
//! ```text
//! BoundSource -> Detached -> Released -> Available -> Rebinding -> BoundTarget
//! ```
//!
//! * `Detached`: backup job and source claim deleted, the volume is `Released` with a stale claim
//!   reference.
//! * `Released`: claim reference cleared, waiting for the control plane to make it `Available`.
//! * `Rebinding`: an equivalent claim naming the same volume has been applied in the target
//!   namespace.
//! * `BoundTarget`: the volume is bound to the new claim and the claim resolves to the volume.
//!
//! A volume that never turns `Available` is only a warning, the claim is applied anyway. A claim
//! that cannot be deleted, or a new claim bound to some other volume, is fatal.
//!
//! Known limitations: claims or volumes left in either namespace by an earlier failed run can
//! confuse the transfer, which is why the sweeper runs first; several `Available` volumes of the
//! backup storage class are refused instead of guessed between.

use std::{collections::BTreeMap, fmt::Display};

use k8s_openapi::{
    api::{
        batch::v1::Job,
        core::v1::{PersistentVolume, PersistentVolumeClaim},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{api::ListParams, ResourceExt as _};
use serde_json::json;
use snafu::{OptionExt as _, ResultExt as _};
use tracing::{info, instrument, warn};

use super::{bound_volume, claim_ref, job::write_log, volume_storage_class, VolumePhase};
use crate::{
    cluster::Cluster,
    config::Settings,
    probe::{wait_for, Probe},
    AmbiguousVolumesSnafu, AppError, ClaimNotDetachedSnafu, KubeSnafu, MissingBackupClaimSnafu,
    Result, UnboundClaimSnafu, YamlSnafu,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferState {
    BoundSource,
    Detached,
    Released,
    Available,
    Rebinding,
    BoundTarget,
}

impl Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BoundSource => "BoundSource",
            Self::Detached => "Detached",
            Self::Released => "Released",
            Self::Available => "Available",
            Self::Rebinding => "Rebinding",
            Self::BoundTarget => "BoundTarget",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug)]
pub struct TransferResult {
    pub namespace: String,
    pub claim: String,
    pub volume: String,
    pub state: TransferState,
    pub warnings: Vec<String>,
}

/// The claim to apply in `namespace`: same name and spec as `snapshot`, including the volume it
/// names, without the metadata or status the server and the binder filled in.
pub fn retarget_claim(snapshot: &PersistentVolumeClaim, namespace: &str) -> PersistentVolumeClaim {
    let annotations = snapshot.metadata.annotations.as_ref().map(|annotations| {
        annotations
            .iter()
            .filter(|(k, _)| {
                !k.starts_with("pv.kubernetes.io/")
                    && !k.starts_with("volume.kubernetes.io/")
                    && !k.starts_with("volume.beta.kubernetes.io/")
                    && k.as_str() != "kubectl.kubernetes.io/last-applied-configuration"
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>()
    });

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: snapshot.metadata.name.clone(),
            namespace: Some(namespace.to_string()),
            labels: snapshot.metadata.labels.clone(),
            annotations: annotations.filter(|x| !x.is_empty()),
            ..Default::default()
        },
        spec: snapshot.spec.clone(),
        status: None,
    }
}

pub struct VolumeTransfer<'a, C> {
    cluster: &'a C,
    settings: &'a Settings,
    state: TransferState,
    expected: Option<String>,
    warnings: Vec<String>,
}

impl<'a, C: Cluster> VolumeTransfer<'a, C> {
    pub fn new(cluster: &'a C, settings: &'a Settings) -> Self {
        Self {
            cluster,
            settings,
            state: TransferState::BoundSource,
            expected: None,
            warnings: Vec::new(),
        }
    }

    /// Refuse to start unless the source claim is still bound to `volume`.
    pub fn expecting(mut self, volume: impl Into<String>) -> Self {
        self.expected = Some(volume.into());
        self
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    fn advance(&mut self, next: TransferState, volume: &str) {
        info!(volume, from = %self.state, to = %next, "Volume transfer");
        self.state = next;
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn source(&self) -> &'a str {
        &self.settings.source_namespace
    }

    fn target(&self) -> &'a str {
        &self.settings.target_namespace
    }

    fn claim_name(&self) -> &'a str {
        &self.settings.app.claim_name
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>> {
        self.cluster
            .get_global::<PersistentVolume>(name)
            .await
            .with_context(|_| KubeSnafu { msg: format!("Failed to read volume {name}") })
    }

    async fn get_claim(&self, namespace: &str) -> Result<Option<PersistentVolumeClaim>> {
        let name = self.claim_name();
        self.cluster
            .get::<PersistentVolumeClaim>(namespace, name)
            .await
            .with_context(|_| KubeSnafu { msg: format!("Failed to read claim {namespace}/{name}") })
    }

    /// Read the source claim and the volume it is bound to.
    async fn snapshot(&self) -> Result<(PersistentVolumeClaim, String)> {
        let (source, name) = (self.source(), self.claim_name());
        let claim = self
            .get_claim(source)
            .await?
            .with_context(|| MissingBackupClaimSnafu { namespace: source, claim: name })?;
        let volume = bound_volume(&claim)
            .with_context(|| UnboundClaimSnafu { namespace: source, claim: name })?
            .to_string();

        if let Some(expected) = self.expected.as_ref().filter(|x| **x != volume) {
            return Err(AppError::VolumeIdentityMismatch {
                namespace: source.to_string(),
                claim: name.to_string(),
                expected: expected.clone(),
                found: volume,
            });
        }

        let path = self.settings.claim_snapshot_path();
        let yaml = serde_yaml::to_string(&claim).context(YamlSnafu)?;
        write_log(&path, &format!("# claim {source}/{name} bound to {volume}"), &yaml).await?;
        info!(claim = name, volume = %volume, path = %path.display(), "Saved claim definition");

        Ok((claim, volume))
    }

    /// Delete the backup job and the source claim, and wait until the claim is gone.
    async fn detach(&mut self, volume: &str) -> Result<()> {
        let (source, name) = (self.source(), self.claim_name());
        let job = self.settings.app.backup_job_name.as_str();

        self.cluster
            .delete::<Job>(source, job)
            .await
            .with_context(|_| KubeSnafu { msg: format!("Failed to delete job {source}/{job}") })?;

        super::remove_claim(self.cluster, source, name).await?;

        let cluster = self.cluster;
        let probe = wait_for(
            "source claim to be deleted",
            &self.settings.app.volume_poll,
            || claim_gone(cluster, source, name),
            |gone| *gone,
        )
        .await?;

        if !probe.is_satisfied() {
            return ClaimNotDetachedSnafu { namespace: source, claim: name }.fail();
        }

        self.advance(TransferState::Detached, volume);
        Ok(())
    }

    /// Clear the volume's claim reference so it can become `Available`.
    async fn release(&mut self, volume: &str) -> Result<()> {
        self.cluster
            .patch_global::<PersistentVolume>(volume, &json!({ "spec": { "claimRef": null } }))
            .await
            .with_context(|_| KubeSnafu {
                msg: format!("Failed to clear claim reference of volume {volume}"),
            })?;

        self.advance(TransferState::Released, volume);
        Ok(())
    }

    async fn wait_available(&mut self, volume: &str) -> Result<()> {
        let probe = wait_for(
            "volume to become Available",
            &self.settings.app.volume_poll,
            || self.get_volume(volume),
            |pv| VolumePhase::of(pv) == Some(VolumePhase::Available),
        )
        .await?;

        match probe {
            Probe::Satisfied(_) => self.advance(TransferState::Available, volume),
            Probe::TimedOut { last, attempts } => {
                let phase = last.as_ref().and_then(VolumePhase::of);
                self.warn(format!(
                    "Volume {volume} is still {} after {attempts} checks, applying the claim anyway",
                    phase.map_or("absent", |x| x.as_str())
                ));
            }
        }
        Ok(())
    }

    /// Refuse to apply the claim when the binder could pick between several volumes.
    async fn check_unambiguous(&self, volume: &str) -> Result<()> {
        let storage_class = self.settings.app.backup_storage_class.as_str();
        let volumes = self
            .cluster
            .list_global::<PersistentVolume>(&ListParams::default())
            .await
            .with_context(|_| KubeSnafu { msg: "Failed to list persistent volumes" })?;

        let available: Vec<String> = volumes
            .iter()
            .filter(|pv| volume_storage_class(pv) == Some(storage_class))
            .filter(|pv| VolumePhase::of(pv) == Some(VolumePhase::Available))
            .map(|pv| pv.name_any())
            .collect();

        if available.iter().any(|x| x != volume) {
            let mut volumes = available;
            if !volumes.iter().any(|x| x == volume) {
                volumes.insert(0, volume.to_string());
            }
            return AmbiguousVolumesSnafu { storage_class, volumes }.fail();
        }
        Ok(())
    }

    async fn rebind(&mut self, snapshot: &PersistentVolumeClaim, volume: &str) -> Result<()> {
        let target = self.target();
        let claim = retarget_claim(snapshot, target);

        self.cluster.apply(target, &claim).await.with_context(|_| KubeSnafu {
            msg: format!("Failed to apply claim {target}/{}", self.claim_name()),
        })?;

        self.advance(TransferState::Rebinding, volume);
        Ok(())
    }

    /// Wait for the volume to be bound to the target claim, then check the claim resolves to the
    /// same volume.
    async fn verify(&mut self, volume: &str) -> Result<()> {
        let (target, name) = (self.target(), self.claim_name());

        let probe = wait_for(
            "volume to be bound to the target claim",
            &self.settings.app.volume_poll,
            || self.get_volume(volume),
            |pv| {
                VolumePhase::of(pv) == Some(VolumePhase::Bound)
                    && claim_ref(pv) == Some((target, name))
            },
        )
        .await?;

        let claim = self.get_claim(target).await?;
        let found = claim.as_ref().and_then(bound_volume);

        match found {
            Some(found) if found != volume => Err(AppError::VolumeIdentityMismatch {
                namespace: target.to_string(),
                claim: name.to_string(),
                expected: volume.to_string(),
                found: found.to_string(),
            }),
            Some(_) if probe.is_satisfied() => {
                self.advance(TransferState::BoundTarget, volume);
                Ok(())
            }
            _ => Err(AppError::VolumeNotBound { volume: volume.to_string() }),
        }
    }

    #[instrument(skip_all, fields(source = %self.settings.source_namespace, target = %self.settings.target_namespace))]
    pub async fn run(mut self) -> Result<TransferResult> {
        let (snapshot, volume) = self.snapshot().await?;
        info!(claim = self.claim_name(), volume = %volume, "Transferring volume");

        self.detach(&volume).await?;
        self.release(&volume).await?;
        self.wait_available(&volume).await?;
        self.check_unambiguous(&volume).await?;
        self.rebind(&snapshot, &volume).await?;
        self.verify(&volume).await?;

        Ok(TransferResult {
            namespace: self.target().to_string(),
            claim: self.claim_name().to_string(),
            volume,
            state: self.state,
            warnings: self.warnings,
        })
    }
}

/// Whether the claim is gone. Finalizers put back on a lingering claim are cleared again.
async fn claim_gone(cluster: &impl Cluster, namespace: &str, name: &str) -> Result<Option<bool>> {
    let claim = cluster
        .get::<PersistentVolumeClaim>(namespace, name)
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to read claim {namespace}/{name}") })?;

    match claim {
        Some(claim) if !claim.finalizers().is_empty() => {
            super::remove_claim(cluster, namespace, name).await?;
            Ok(Some(false))
        }
        Some(_) => Ok(Some(false)),
        None => Ok(Some(true)),
    }
}

/// Move the backup claim's volume from the source to the target namespace.
pub async fn transfer(cluster: &impl Cluster, settings: &Settings) -> Result<TransferResult> {
    VolumeTransfer::new(cluster, settings).run().await
}
