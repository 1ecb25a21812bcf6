use std::path::PathBuf;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Namespace;
use snafu::{OptionExt as _, ResultExt as _};
use tracing::{error, info, instrument, warn};

pub mod cluster;
pub mod config;
pub mod error;
pub mod probe;
pub mod tasks;
pub mod telemetry;

pub use error::*;

use crate::{
    cluster::Cluster,
    config::Settings,
    tasks::{
        backup::{grant_admin_access, run_backup},
        cleanup::{cleanup, CleanupSummary},
        restore::run_restore,
        storage::ensure_backup_storage_class,
        transfer::VolumeTransfer,
    },
};

/// Field manager, label value and default config file name.
pub const MIGRATOR: &str = "mongo-migrate";

pub const DEFAULT_SOURCE_NAMESPACE: &str = "ibm-common-services";

/// Summary of a completed migration.
#[derive(Clone, Debug)]
pub struct MigrationReport {
    pub source_namespace: String,
    pub target_namespace: String,
    /// The volume holding the dump, bound to the claim in the target namespace.
    pub volume: String,
    pub backup_log: PathBuf,
    pub restore_log: PathBuf,
    /// Non-fatal problems met on the way, in order.
    pub warnings: Vec<String>,
    /// What the closing sweep removed.
    pub removed: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one migration of the backup volume between a namespace pair.
pub struct Migration<C> {
    cluster: C,
    settings: Settings,
}

impl<C: Cluster> Migration<C> {
    pub fn new(cluster: C, settings: Settings) -> Self {
        Self { cluster, settings }
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Both namespaces must exist. Also the first call to reach the cluster.
    pub async fn preflight(&self) -> Result<()> {
        for namespace in [&self.settings.source_namespace, &self.settings.target_namespace] {
            self.cluster
                .get_global::<Namespace>(namespace)
                .await
                .with_context(|_| KubeSnafu { msg: format!("Failed to read namespace {namespace}") })?
                .with_context(|| MissingNamespaceSnafu { namespace: namespace.clone() })?;
        }
        Ok(())
    }

    pub async fn cleanup(&self) -> Result<CleanupSummary> {
        cleanup(&self.cluster, &self.settings).await
    }

    /// Run the whole cycle. On a fatal error nothing is rolled back unless `cleanup_on_failure`
    /// is set; otherwise the `cleanup` command has to be run before retrying.
    #[instrument(skip_all, fields(source = %self.settings.source_namespace, target = %self.settings.target_namespace))]
    pub async fn run(&self) -> Result<MigrationReport> {
        let started_at = Utc::now();

        match self.execute(started_at).await {
            Ok(report) => {
                info!(
                    volume = %report.volume,
                    warnings = report.warnings.len(),
                    "Migration finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(kind = %err.kind(), "Migration failed: {err}");
                if self.settings.app.cleanup_on_failure {
                    if let Err(cleanup_err) = self.cleanup().await {
                        warn!("Cleanup after failure did not complete: {cleanup_err}");
                    }
                } else {
                    warn!("Resources were left in place, run the cleanup command before retrying");
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, started_at: DateTime<Utc>) -> Result<MigrationReport> {
        let (cluster, settings) = (&self.cluster, &self.settings);
        let mut warnings = Vec::new();

        self.preflight().await?;
        self.cleanup().await?;

        ensure_backup_storage_class(cluster, settings).await?;
        grant_admin_access(cluster, settings).await?;

        let backup = run_backup(cluster, settings).await?;
        info!(claim = %backup.claim, volume = %backup.volume, "Backup ready to move");

        let transferred = VolumeTransfer::new(cluster, settings)
            .expecting(&backup.volume)
            .run()
            .await?;
        warnings.extend(transferred.warnings);

        let restore = run_restore(cluster, settings).await?;
        if !restore.job.state.is_some_and(|x| x.succeeded()) {
            warnings.push(format!("Restore job {} did not report success", restore.job.job));
        }

        let removed = self.cleanup().await?.removed;

        Ok(MigrationReport {
            source_namespace: settings.source_namespace.clone(),
            target_namespace: settings.target_namespace.clone(),
            volume: transferred.volume,
            backup_log: backup.log_path,
            restore_log: restore.log_path,
            warnings,
            removed,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
