use std::{fmt::Display, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt as _, ResultExt as _};

use crate::{
    ConfigSnafu, MissingTargetNamespaceSnafu, Result, SameNamespaceSnafu, DEFAULT_SOURCE_NAMESPACE,
    MIGRATOR,
};

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    /// Name of the claim the backup job writes its dump to. The same name is used in the target
    /// namespace.
    pub claim_name: String,

    /// Storage class created for the backup claim. Always has a `Retain` reclaim policy.
    pub backup_storage_class: String,

    pub role_binding_name: String,
    pub cluster_role: String,
    pub service_account: String,

    /// Claims of the running database, used to find the storage class to derive from.
    pub database_claim_prefix: String,

    pub backup_job_name: String,
    pub restore_job_name: String,
    pub backup_job_image: String,
    pub restore_job_image: String,

    /// Merged over both job templates, containers are merged by name.
    pub job_overrides: serde_json::Value,

    pub claim_size: String,

    /// Where job logs and the claim snapshot are written.
    pub log_dir: PathBuf,

    pub volume_poll: PollPolicy,
    pub job_poll: PollPolicy,

    pub cleanup_on_failure: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            claim_name: "cs-mongodump".into(),
            backup_storage_class: "backup-sc".into(),
            role_binding_name: "cs-mongodump-admin".into(),
            cluster_role: "cluster-admin".into(),
            service_account: "default".into(),
            database_claim_prefix: "mongodbdir-icp-mongodb".into(),
            backup_job_name: "mongodb-backup".into(),
            restore_job_name: "mongodb-restore".into(),
            backup_job_image: "quay.io/opencloudio/ibm-mongodb:latest".into(),
            restore_job_image: "quay.io/opencloudio/ibm-mongodb:latest".into(),
            job_overrides: serde_json::Value::Null,
            claim_size: "20Gi".into(),
            log_dir: PathBuf::from("."),
            volume_poll: PollPolicy::default(),
            job_poll: PollPolicy { attempts: 120, interval: IntervalSpec("10s".into()) },
            cleanup_on_failure: false,
        }
    }
}

impl AppConfig {
    /// Load from the file named by `APP_CONFIG` (optional) layered with `APP_*` variables.
    pub fn load(file: Option<&str>) -> Result<Self> {
        let config_source = config::Config::builder()
            .add_source(config::File::with_name(file.unwrap_or(MIGRATOR)).required(false))
            .add_source(config::Environment::with_prefix("APP").prefix_separator("_").separator("__"))
            .build()
            .context(ConfigSnafu)?;

        let config: AppConfig = config_source.try_deserialize().context(ConfigSnafu)?;
        config.volume_poll.interval.as_duration()?;
        config.job_poll.interval.as_duration()?;
        Ok(config)
    }
}

/// Bounded retry budget for the prober: `attempts` observations, `interval` apart.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub interval: IntervalSpec,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { attempts: 6, interval: IntervalSpec("30s".into()) }
    }
}

impl PollPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval: IntervalSpec(format!("{}s", interval.as_secs())) }
    }

    pub fn interval(&self) -> Result<Duration> {
        self.interval.as_duration()
    }
}

/// Duration written as `30s`, `5m`, `1h30m`, `2d` or `1w`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct IntervalSpec(pub String);

impl IntervalSpec {
    pub fn as_duration(&self) -> Result<Duration> {
        let invalid = |reason: &str| crate::AppError::InvalidInterval {
            value: self.0.clone(),
            reason: reason.to_string(),
        };

        let mut duration = Duration::new(0, 0);
        let mut buffer = String::with_capacity(5);
        for char in self.0.trim().chars() {
            if char.is_ascii_digit() {
                buffer.push(char);
                continue;
            }
            if buffer.is_empty() {
                return Err(invalid("missing number before unit"));
            }
            let digits: u64 = buffer.parse().map_err(|_| invalid("number too large"))?;
            buffer.clear();
            let unit: u64 = match char {
                's' => 1,
                'm' => 60,
                'h' => 60 * 60,
                'd' => 60 * 60 * 24,
                'w' => 60 * 60 * 24 * 7,
                x => return Err(invalid(&format!("unknown unit `{x}`"))),
            };
            duration = digits
                .checked_mul(unit)
                .and_then(|secs| duration.checked_add(Duration::from_secs(secs)))
                .ok_or_else(|| invalid("too large"))?;
        }

        if !buffer.is_empty() {
            return Err(invalid("missing unit after number"));
        }
        if self.0.trim().is_empty() {
            return Err(invalid("empty"));
        }

        Ok(duration)
    }
}

impl Display for IntervalSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a run needs: the namespace pair plus application configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub source_namespace: String,
    pub target_namespace: String,
    pub app: AppConfig,
}

impl Settings {
    pub fn new(
        source_namespace: Option<String>, target_namespace: Option<String>, app: AppConfig,
    ) -> Result<Self> {
        let source_namespace = source_namespace
            .filter(|x| !x.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE_NAMESPACE.to_string());
        let target_namespace = target_namespace
            .filter(|x| !x.trim().is_empty())
            .context(MissingTargetNamespaceSnafu)?;

        ensure!(
            source_namespace != target_namespace,
            SameNamespaceSnafu { namespace: source_namespace }
        );

        Ok(Self { source_namespace, target_namespace, app })
    }

    pub fn backup_log_path(&self) -> PathBuf {
        self.app.log_dir.join(format!(
            "mongo-backup-{}-to-{}.log",
            self.source_namespace, self.target_namespace
        ))
    }

    pub fn restore_log_path(&self) -> PathBuf {
        self.app.log_dir.join(format!(
            "mongo-restore-{}-to-{}.log",
            self.source_namespace, self.target_namespace
        ))
    }

    pub fn claim_snapshot_path(&self) -> PathBuf {
        self.app.log_dir.join(format!(
            "{}-{}-{}.yaml",
            self.app.claim_name, self.source_namespace, self.target_namespace
        ))
    }
}
