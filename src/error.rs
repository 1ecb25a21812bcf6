use std::path::PathBuf;

#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("SerializationError: {source}"))]
    SerializationError { source: serde_json::Error },

    #[snafu(display("Unable to write claim snapshot as yaml: {source}"))]
    YamlError { source: serde_yaml::Error },

    #[snafu(display("Kube Error: {msg}: {source}"))]
    KubeError { msg: String, source: kube::Error },

    #[snafu(display("Unable to load configuration: {source}"))]
    ConfigError { source: config::ConfigError },

    #[snafu(display("Invalid interval `{value}`: {reason}"))]
    InvalidInterval { value: String, reason: String },

    #[snafu(display("No target namespace given, refusing to start"))]
    MissingTargetNamespace,

    #[snafu(display("Source and target namespace are both `{namespace}`"))]
    SameNamespace { namespace: String },

    #[snafu(display("Namespace `{namespace}` does not exist"))]
    MissingNamespace { namespace: String },

    #[snafu(display("No volume bound to a claim starting with `{prefix}` in namespace {namespace}"))]
    MissingDatabaseVolume { namespace: String, prefix: String },

    #[snafu(display("Database volumes in {namespace} use several storage classes: {classes:?}"))]
    AmbiguousStorageClass { namespace: String, classes: Vec<String> },

    #[snafu(display("Storage class `{name}` not found"))]
    MissingStorageClass { name: String },

    #[snafu(display("Backup produced no claim {namespace}/{claim}"))]
    MissingBackupClaim { namespace: String, claim: String },

    #[snafu(display(
        "Claim {claim} uses storage class `{found}` instead of `{expected}`, transferring it could destroy its volume"
    ))]
    WrongStorageClass { claim: String, expected: String, found: String },

    #[snafu(display("Claim {namespace}/{claim} is not bound to a volume"))]
    UnboundClaim { namespace: String, claim: String },

    #[snafu(display("Claim {namespace}/{claim} still exists after deletion"))]
    ClaimNotDetached { namespace: String, claim: String },

    #[snafu(display("Volume {volume} did not become Bound again"))]
    VolumeNotBound { volume: String },

    #[snafu(display("Claim {namespace}/{claim} bound to volume `{found}`, expected `{expected}`"))]
    VolumeIdentityMismatch { namespace: String, claim: String, expected: String, found: String },

    #[snafu(display("Several volumes of storage class `{storage_class}` are Available: {volumes:?}"))]
    AmbiguousVolumes { storage_class: String, volumes: Vec<String> },

    #[snafu(display("Backup job {namespace}/{job} {reason}, its volume is not moved"))]
    BackupJobFailed { namespace: String, job: String, reason: String },

    #[snafu(display("No pod found for job {namespace}/{job}"))]
    PodNotFound { namespace: String, job: String },

    #[snafu(display("Unable to write {}: {source}", path.display()))]
    LogIoError { path: PathBuf, source: std::io::Error },
}

impl AppError {
    /// Short lowercase identifier of the variant, used as a log field.
    pub fn kind(&self) -> String {
        let debug = format!("{self:?}");
        let end = debug.find(|c: char| !c.is_alphanumeric()).unwrap_or(debug.len());
        debug[..end].to_lowercase()
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
