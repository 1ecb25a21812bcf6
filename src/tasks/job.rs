use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
};

use chrono::Utc;
use k8s_openapi::api::{batch::v1::Job, core::v1::Pod};
use kube::{api::ListParams, ResourceExt as _};
use serde_json::{json, Value};
use snafu::{OptionExt as _, ResultExt as _};
use tracing::{info, warn};

use crate::{
    cluster::{is_conflict, Cluster},
    config::Settings,
    probe::{wait_for, Probe},
    KubeSnafu, LogIoSnafu, PodNotFoundSnafu, Result, SerializationSnafu, MIGRATOR,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    Backup,
    Restore,
}

impl Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
        }
    }

    pub fn job_name<'a>(&self, settings: &'a Settings) -> &'a str {
        match self {
            Self::Backup => &settings.app.backup_job_name,
            Self::Restore => &settings.app.restore_job_name,
        }
    }

    /// Backups run next to the database being dumped, restores in the namespace it moves to.
    pub fn namespace<'a>(&self, settings: &'a Settings) -> &'a str {
        match self {
            Self::Backup => &settings.source_namespace,
            Self::Restore => &settings.target_namespace,
        }
    }

    fn image<'a>(&self, settings: &'a Settings) -> &'a str {
        match self {
            Self::Backup => &settings.app.backup_job_image,
            Self::Restore => &settings.app.restore_job_image,
        }
    }

    pub fn log_path(&self, settings: &Settings) -> PathBuf {
        match self {
            Self::Backup => settings.backup_log_path(),
            Self::Restore => settings.restore_log_path(),
        }
    }
}

/// Counters of a Job's pods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobState {
    pub active: i32,
    pub succeeded: i32,
    pub failed: i32,
    pub backoff_limit: i32,
}

impl JobState {
    pub fn of(job: &Job) -> Self {
        let backoff_limit = job.spec.as_ref().and_then(|x| x.backoff_limit).unwrap_or(6);
        let status = job.status.as_ref();

        Self {
            active: status.and_then(|x| x.active).unwrap_or(0),
            succeeded: status.and_then(|x| x.succeeded).unwrap_or(0),
            failed: status.and_then(|x| x.failed).unwrap_or(0),
            backoff_limit,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded > 0
    }

    pub fn failed(&self) -> bool {
        self.failed > self.backoff_limit
    }

    pub fn completed(&self) -> bool {
        self.succeeded() || self.failed()
    }

    /// Pods still running with no final result yet.
    pub fn running(&self) -> bool {
        self.active > 0 && !self.completed()
    }
}

/// What a finished job run left behind.
#[derive(Clone, Debug)]
pub struct JobOutcome {
    pub job: String,
    pub pod: String,
    pub state: Option<JobState>,
    pub log_path: PathBuf,
}

pub(crate) fn job_spec(kind: JobKind, settings: &Settings) -> Value {
    let app = &settings.app;
    let name = kind.job_name(settings);

    let mut spec = json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": name,
            "namespace": kind.namespace(settings),
            "labels": {
                "app.kubernetes.io/created-by": MIGRATOR,
                "app.kubernetes.io/component": kind.as_str(),
            },
        },
        "spec": {
            "backoffLimit": 3,
            "template": {
                "metadata": {
                    "labels": {
                        "app.kubernetes.io/created-by": MIGRATOR,
                    }
                },
                "spec": {
                    "serviceAccountName": app.service_account,
                    "containers": [{
                        "name": "mongodb",
                        "image": kind.image(settings),
                        "args": [kind.as_str()],
                        "env": [
                            { "name": "SOURCE_NAMESPACE", "value": settings.source_namespace },
                            { "name": "TARGET_NAMESPACE", "value": settings.target_namespace },
                            { "name": "DUMP_PATH", "value": "/dump" },
                        ],
                        "volumeMounts": [{ "name": "dump", "mountPath": "/dump" }],
                    }],
                    "volumes": [{
                        "name": "dump",
                        "persistentVolumeClaim": { "claimName": app.claim_name },
                    }],
                    "restartPolicy": "Never",
                }
            }
        }
    });

    if !app.job_overrides.is_null() {
        merge(&mut spec, app.job_overrides.clone());
    }
    spec
}

/// Create the job, reusing one left by an earlier attempt.
pub(crate) async fn launch_job(cluster: &impl Cluster, kind: JobKind, settings: &Settings) -> Result<Job> {
    let namespace = kind.namespace(settings);
    let name = kind.job_name(settings);
    let job: Job = serde_json::from_value(job_spec(kind, settings)).context(SerializationSnafu)?;

    match cluster.create(namespace, &job).await {
        Ok(job) => {
            info!(namespace, job = name, "Started {kind} job");
            Ok(job)
        }
        Err(err) if is_conflict(&err) => {
            warn!(namespace, job = name, "{kind} job already exists, reusing it");
            let existing = cluster
                .get::<Job>(namespace, name)
                .await
                .with_context(|_| KubeSnafu { msg: format!("Failed to read {kind} job") })?;
            match existing {
                Some(job) => Ok(job),
                None => cluster.create(namespace, &job).await.with_context(|_| KubeSnafu {
                    msg: format!("Failed to create {kind} job"),
                }),
            }
        }
        Err(err) => {
            Err(err).with_context(|_| KubeSnafu { msg: format!("Failed to create {kind} job") })
        }
    }
}

pub(crate) fn pod_belongs_to_job(pod: &str, job: &str) -> bool {
    pod.strip_prefix(job).is_some_and(|rest| rest.starts_with('-'))
}

/// Find the pod a job ran in: by its `job-name` label, else the first pod named `<job>-*`.
pub(crate) async fn find_job_pod(
    cluster: &impl Cluster, namespace: &str, job: &str,
) -> Result<Option<Pod>> {
    let labelled = cluster
        .list::<Pod>(namespace, &ListParams::default().labels(&format!("job-name={job}")))
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to list pods of job {job}") })?;

    if let Some(pod) = latest(labelled) {
        return Ok(Some(pod));
    }

    let all = cluster
        .list::<Pod>(namespace, &ListParams::default())
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to list pods in {namespace}") })?;

    Ok(all.into_iter().find(|pod| pod_belongs_to_job(&pod.name_any(), job)))
}

fn latest(pods: Vec<Pod>) -> Option<Pod> {
    pods.into_iter().max_by(|x, y| x.creation_timestamp().cmp(&y.creation_timestamp()))
}

pub(crate) async fn write_log(path: &Path, header: &str, logs: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|x| !x.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.with_context(|_| LogIoSnafu { path })?;
    }

    let contents = format!("{header}\n{logs}");
    tokio::fs::write(path, contents).await.with_context(|_| LogIoSnafu { path })
}

/// Launch a job, wait for it to finish, and save its pod's logs.
///
/// A job that fails or outlives `job_poll` is only warned about here. Callers decide from
/// [`JobOutcome::state`] whether its work is usable.
pub(crate) async fn run_job(cluster: &impl Cluster, kind: JobKind, settings: &Settings) -> Result<JobOutcome> {
    let namespace = kind.namespace(settings);
    let name = kind.job_name(settings);
    launch_job(cluster, kind, settings).await?;

    let probe = wait_for(
        &format!("{kind} job to finish"),
        &settings.app.job_poll,
        || async move {
            cluster
                .get::<Job>(namespace, name)
                .await
                .with_context(|_| KubeSnafu { msg: format!("Failed to read {kind} job") })
        },
        |job| JobState::of(job).completed(),
    )
    .await?;

    let state = match &probe {
        Probe::Satisfied(job) => Some(JobState::of(job)),
        Probe::TimedOut { last, .. } => {
            let state = last.as_ref().map(JobState::of);
            let active = state.map_or(0, |x| x.active);
            warn!(namespace, job = name, active, "{kind} job did not finish in time");
            state
        }
    };
    if state.is_some_and(|x| x.failed()) {
        warn!(namespace, job = name, ?state, "{kind} job failed");
    }

    let pod = find_job_pod(cluster, namespace, name)
        .await?
        .with_context(|| PodNotFoundSnafu { namespace, job: name })?;
    let pod_name = pod.name_any();

    let logs = cluster
        .pod_logs(namespace, &pod_name)
        .await
        .with_context(|_| KubeSnafu { msg: format!("Failed to read logs of pod {pod_name}") })?;

    let log_path = kind.log_path(settings);
    let header = format!(
        "# {kind} job {namespace}/{name}, pod {pod_name}, captured {}",
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    );
    write_log(&log_path, &header, &logs).await?;
    info!(namespace, job = name, pod = %pod_name, path = %log_path.display(), "Saved {kind} logs");

    Ok(JobOutcome { job: name.to_string(), pod: pod_name, state, log_path })
}

fn merge(a: &mut Value, b: Value) {
    match (a, b) {
        // Merge objects by key
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                if v.is_null() {
                    a.remove(&k);
                } else {
                    merge(a.entry(k).or_insert(Value::Null), v);
                }
            }
        }
        // If list of objects with field 'name', merge by 'name' field
        (Value::Array(a), Value::Array(b))
            if a.iter().all(|x| x.get("name").is_some())
                && b.iter().all(|x| x.get("name").is_some()) =>
        {
            let mut by_name: BTreeMap<_, _> = b
                .into_iter()
                .filter_map(|x| Some((x.get("name")?.as_str()?.to_owned(), x)))
                .collect();
            for el in a.iter_mut() {
                if let Some(new_el) =
                    el.get("name").and_then(|x| x.as_str()).and_then(|x| by_name.remove(x))
                {
                    merge(el, new_el);
                }
            }
            a.extend(by_name.into_values());
        }
        // Default to atomic merge
        (a, b) => *a = b,
    }
}
