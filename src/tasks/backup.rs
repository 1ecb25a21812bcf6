use std::path::PathBuf;

use k8s_openapi::api::{
    core::v1::PersistentVolumeClaim,
    rbac::v1::{ClusterRoleBinding, Subject},
};
use kube::ResourceExt as _;
use serde_json::json;
use snafu::{ensure, OptionExt as _, ResultExt as _};
use tracing::{info, instrument};

use super::{
    bound_volume, claim_storage_class,
    job::{run_job, JobKind, JobOutcome},
};
use crate::{
    cluster::{is_conflict, Cluster},
    config::Settings,
    BackupJobFailedSnafu, KubeSnafu, MissingBackupClaimSnafu, Result, SerializationSnafu,
    UnboundClaimSnafu, WrongStorageClassSnafu, MIGRATOR,
};

/// The claim the backup job filled, ready to be moved.
#[derive(Clone, Debug)]
pub struct BackupResult {
    pub claim: String,
    /// Volume the claim was bound to once the job finished.
    pub volume: String,
    pub log_path: PathBuf,
    pub job: JobOutcome,
}

/// Bind `cluster_role` to the source namespace's service account so the backup job can read
/// cluster-level resources. An existing binding gains the subject if it lacks it.
pub async fn grant_admin_access(cluster: &impl Cluster, settings: &Settings) -> Result<()> {
    let app = &settings.app;
    let name = app.role_binding_name.as_str();
    let namespace = settings.source_namespace.as_str();

    let subject = Subject {
        kind: "ServiceAccount".into(),
        name: app.service_account.clone(),
        namespace: Some(namespace.into()),
        ..Default::default()
    };

    let existing = cluster
        .get_global::<ClusterRoleBinding>(name)
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to read cluster role binding {name}") })?;

    match existing {
        Some(existing_binding) => {
            let mut subjects = existing_binding.subjects.clone().unwrap_or_default();
            if subjects.iter().any(|x| x.name == subject.name && x.namespace == subject.namespace) {
                info!(binding = name, "Cluster role binding already grants access");
                return Ok(());
            }
            subjects.push(subject);

            cluster
                .patch_global::<ClusterRoleBinding>(name, &json!({ "subjects": subjects }))
                .await
                .with_context(|_| KubeSnafu {
                    msg: format!("Failed to update cluster role binding {name}"),
                })?;
            info!(binding = name, namespace, "Added service account to cluster role binding");
        }
        None => {
            let binding: ClusterRoleBinding = serde_json::from_value(json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRoleBinding",
                "metadata": {
                    "name": name,
                    "labels": {
                        "app.kubernetes.io/created-by": MIGRATOR,
                    },
                },
                "roleRef": {
                    "apiGroup": "rbac.authorization.k8s.io",
                    "kind": "ClusterRole",
                    "name": app.cluster_role,
                },
                "subjects": [subject],
            }))
            .context(SerializationSnafu)?;

            match cluster.create_global(&binding).await {
                Ok(_) => info!(binding = name, namespace, "Created cluster role binding"),
                Err(err) if is_conflict(&err) => {
                    info!(binding = name, "Cluster role binding created concurrently")
                }
                Err(err) => {
                    return Err(err).with_context(|_| KubeSnafu {
                        msg: format!("Failed to create cluster role binding {name}"),
                    })
                }
            }
        }
    }

    Ok(())
}

pub(crate) fn backup_claim_spec(settings: &Settings) -> Result<PersistentVolumeClaim> {
    let app = &settings.app;
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": {
            "name": app.claim_name,
            "namespace": settings.source_namespace,
            "labels": {
                "app.kubernetes.io/created-by": MIGRATOR,
            },
        },
        "spec": {
            "storageClassName": app.backup_storage_class,
            "accessModes": ["ReadWriteOnce"],
            "resources": {
                "requests": {
                    "storage": app.claim_size,
                }
            }
        }
    }))
    .context(SerializationSnafu)
}

/// Check the backup left a claim behind and that it sits on the retaining storage class.
pub(crate) fn validate_backup_claim(
    claim: Option<PersistentVolumeClaim>, settings: &Settings,
) -> Result<PersistentVolumeClaim> {
    let app = &settings.app;
    let claim = claim.with_context(|| MissingBackupClaimSnafu {
        namespace: settings.source_namespace.clone(),
        claim: app.claim_name.clone(),
    })?;

    let found = claim_storage_class(&claim).unwrap_or_default();
    ensure!(
        found == app.backup_storage_class,
        WrongStorageClassSnafu {
            claim: claim.name_any(),
            expected: app.backup_storage_class.clone(),
            found,
        }
    );

    Ok(claim)
}

/// Only a job that reported success produced a dump worth moving.
pub(crate) fn check_backup_job(outcome: &JobOutcome, namespace: &str) -> Result<()> {
    let reason = match outcome.state {
        Some(state) if state.succeeded() => return Ok(()),
        Some(state) if state.failed() => format!("failed {} times", state.failed),
        Some(state) if state.running() => format!("still has {} pods running", state.active),
        Some(_) => "did not finish".to_string(),
        None => "was never observed".to_string(),
    };
    BackupJobFailedSnafu { namespace, job: outcome.job.as_str(), reason }.fail()
}

/// Trigger the backup job in the source namespace and validate what it produced.
#[instrument(skip_all, fields(source = %settings.source_namespace, target = %settings.target_namespace))]
pub async fn run_backup(cluster: &impl Cluster, settings: &Settings) -> Result<BackupResult> {
    let namespace = settings.source_namespace.as_str();
    let claim_name = settings.app.claim_name.as_str();

    let claim = backup_claim_spec(settings)?;
    match cluster.create(namespace, &claim).await {
        Ok(_) => info!(namespace, claim = claim_name, "Created backup claim"),
        Err(err) if is_conflict(&err) => {
            info!(namespace, claim = claim_name, "Backup claim already exists")
        }
        Err(err) => {
            return Err(err).with_context(|_| KubeSnafu {
                msg: format!("Failed to create claim {namespace}/{claim_name}"),
            })
        }
    }

    let job = run_job(cluster, JobKind::Backup, settings).await?;
    check_backup_job(&job, namespace)?;

    let claim = cluster
        .get::<PersistentVolumeClaim>(namespace, claim_name)
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to read claim {namespace}/{claim_name}") })?;
    let claim = validate_backup_claim(claim, settings)?;
    let volume = bound_volume(&claim)
        .with_context(|| UnboundClaimSnafu { namespace, claim: claim_name })?
        .to_string();

    info!(namespace, claim = claim_name, volume = %volume, "Backup finished");
    Ok(BackupResult {
        claim: claim_name.to_string(),
        volume,
        log_path: job.log_path.clone(),
        job,
    })
}
