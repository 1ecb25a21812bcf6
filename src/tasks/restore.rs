use std::path::PathBuf;

use tracing::{info, instrument, warn};

use super::job::{run_job, JobKind, JobOutcome};
use crate::{cluster::Cluster, config::Settings, Result};

#[derive(Clone, Debug)]
pub struct RestoreResult {
    pub log_path: PathBuf,
    pub job: JobOutcome,
}

/// Run the restore job against the transferred claim in the target namespace.
///
/// Success only means the logs were captured. The job's own result is logged but not checked,
/// read the restore log to confirm the data arrived.
#[instrument(skip_all, fields(source = %settings.source_namespace, target = %settings.target_namespace))]
pub async fn run_restore(cluster: &impl Cluster, settings: &Settings) -> Result<RestoreResult> {
    let job = run_job(cluster, JobKind::Restore, settings).await?;

    match job.state {
        Some(state) if state.succeeded() => info!(job = %job.job, "Restore job succeeded"),
        state => warn!(job = %job.job, ?state, "Restore job did not report success"),
    }

    Ok(RestoreResult { log_path: job.log_path.clone(), job })
}
