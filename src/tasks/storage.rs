use std::collections::BTreeSet;

use k8s_openapi::{
    api::{core::v1::PersistentVolume, storage::v1::StorageClass},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::api::ListParams;
use snafu::{ensure, OptionExt as _, ResultExt as _};
use tracing::{info, instrument, warn};

use super::{claim_ref, volume_storage_class};
use crate::{
    cluster::{is_conflict, Cluster},
    config::Settings,
    AmbiguousStorageClassSnafu, KubeSnafu, MissingDatabaseVolumeSnafu, MissingStorageClassSnafu,
    Result, MIGRATOR,
};

pub const RETAIN: &str = "Retain";

/// Storage class of the volumes backing the database claims in the source namespace.
///
/// Volumes are matched on their claim reference: namespace equal to the source namespace and
/// claim name starting with `database_claim_prefix`. All matches must agree on one class.
pub async fn database_storage_class(cluster: &impl Cluster, settings: &Settings) -> Result<String> {
    let namespace = settings.source_namespace.as_str();
    let prefix = settings.app.database_claim_prefix.as_str();

    let volumes = cluster
        .list_global::<PersistentVolume>(&ListParams::default())
        .await
        .with_context(|_| KubeSnafu { msg: "Failed to list persistent volumes" })?;

    let classes: BTreeSet<String> = volumes
        .iter()
        .filter(|pv| {
            claim_ref(pv).is_some_and(|(ns, name)| ns == namespace && name.starts_with(prefix))
        })
        .filter_map(|pv| volume_storage_class(pv).map(str::to_string))
        .collect();

    ensure!(!classes.is_empty(), MissingDatabaseVolumeSnafu { namespace, prefix });
    ensure!(
        classes.len() == 1,
        AmbiguousStorageClassSnafu { namespace, classes: classes.into_iter().collect::<Vec<_>>() }
    );

    Ok(classes.into_iter().next().unwrap_or_default())
}

/// Copy of `source` named `name`, with reclaim policy forced to `Retain` so deleting a claim never
/// deletes the data behind it.
pub fn derive_backup_storage_class(source: &StorageClass, name: &str) -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(maplit::btreemap! {
                "app.kubernetes.io/created-by".to_string() => MIGRATOR.to_string(),
            }),
            ..Default::default()
        },
        reclaim_policy: Some(RETAIN.to_string()),
        ..source.clone()
    }
}

/// Make sure the backup storage class exists, creating it from the database's storage class.
#[instrument(skip_all, fields(source = %settings.source_namespace))]
pub async fn ensure_backup_storage_class(
    cluster: &impl Cluster, settings: &Settings,
) -> Result<StorageClass> {
    let name = settings.app.backup_storage_class.as_str();

    let existing = cluster
        .get_global::<StorageClass>(name)
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to read storage class {name}") })?;
    if let Some(existing) = existing {
        info!(storage_class = name, "Storage class exists from an earlier attempt, reusing it");
        if existing.reclaim_policy.as_deref() != Some(RETAIN) {
            warn!(
                storage_class = name,
                reclaim_policy = existing.reclaim_policy.as_deref().unwrap_or("Delete"),
                "Existing backup storage class does not retain volumes"
            );
        }
        return Ok(existing);
    }

    let source_name = database_storage_class(cluster, settings).await?;
    let source = cluster
        .get_global::<StorageClass>(&source_name)
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to read storage class {source_name}") })?
        .with_context(|| MissingStorageClassSnafu { name: source_name.clone() })?;

    let derived = derive_backup_storage_class(&source, name);
    match cluster.create_global(&derived).await {
        Ok(created) => {
            info!(storage_class = name, from = %source_name, "Created backup storage class");
            Ok(created)
        }
        Err(err) if is_conflict(&err) => {
            info!(storage_class = name, "Storage class created concurrently, reusing it");
            Ok(derived)
        }
        Err(err) => Err(err).with_context(|_| KubeSnafu {
            msg: format!("Failed to create storage class {name}"),
        }),
    }
}
