use clap::{Args, Parser, Subcommand};
use mongo_migrate::{
    cluster::KubeCluster,
    config::{AppConfig, Settings},
    Migration, Result,
};
use tracing::info;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file, any format the config crate reads. Missing files are ignored.
    #[arg(long, global = true, env = "APP_CONFIG")]
    config: Option<String>,
}

#[derive(Clone, Debug, Subcommand)]
enum Commands {
    /// Back up the database, move the backup volume to the target namespace and restore it there.
    Migrate(Namespaces),
    /// Remove everything a migration leaves behind in both namespaces.
    Cleanup(Namespaces),
}

#[derive(Clone, Debug, Args)]
struct Namespaces {
    /// Namespace the database currently runs in. Defaults to ibm-common-services.
    #[arg(long, env = "FROM_NAMESPACE")]
    from_namespace: Option<String>,

    #[arg(long, env = "TO_NAMESPACE")]
    to_namespace: Option<String>,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<()> {
    mongo_migrate::telemetry::init();

    let args = Cli::parse();
    let app = AppConfig::load(args.config.as_deref())?;

    let (namespaces, migrate) = match args.command {
        Commands::Migrate(namespaces) => (namespaces, true),
        Commands::Cleanup(namespaces) => (namespaces, false),
    };
    // Validated before any client exists, so bad arguments never touch the cluster
    let settings = Settings::new(namespaces.from_namespace, namespaces.to_namespace, app)?;

    let migration = Migration::new(KubeCluster::try_default().await?, settings);

    if migrate {
        let report = migration.run().await?;
        info!(
            volume = %report.volume,
            backup_log = %report.backup_log.display(),
            restore_log = %report.restore_log.display(),
            "Migrated {} to {}",
            report.source_namespace,
            report.target_namespace
        );
        for warning in &report.warnings {
            info!("Warning during migration: {warning}");
        }
    } else {
        let summary = migration.cleanup().await?;
        info!(removed = summary.removed.len(), "Cleanup complete");
    }

    Ok(())
}
