use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use webhook_cert_operator::config::CertConfig;
use webhook_cert_operator::controller::{
    KubeRestartTrigger, KubeSecretStore, KubeWebhookRegistry, ReconcileOutcome, Reconciler,
    SystemClock,
};
use webhook_cert_operator::Error;

type KubeReconciler =
    Reconciler<KubeSecretStore, KubeWebhookRegistry, KubeRestartTrigger, SystemClock>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue a fresh CA and serving certificate and publish them
    Bootstrap(CertArgs),
    /// Run a single reconciliation pass
    Reconcile(CertArgs),
    /// Reconcile periodically until interrupted
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct CertArgs {
    #[command(flatten)]
    cert: CertConfig,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    cert: CertConfig,

    /// Seconds between reconciliation passes
    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value_t = 3600)]
    interval_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("webhook-cert-operator v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Bootstrap(cmd) => {
            init_tracing(args.log_format);
            let outcome = build_reconciler(&cmd.cert).await?.bootstrap().await?;
            report(outcome);
            Ok(())
        }
        Commands::Reconcile(cmd) => {
            init_tracing(args.log_format);
            let outcome = build_reconciler(&cmd.cert).await?.reconcile().await?;
            report(outcome);
            Ok(())
        }
        Commands::Run(run_args) => {
            init_tracing(args.log_format);
            run_loop(run_args).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true))
            .init(),
    }
}

async fn build_reconciler(config: &CertConfig) -> Result<KubeReconciler, Error> {
    config.validate()?;

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!(
        namespace = %config.namespace,
        secret = %config.secret_name,
        webhook = %config.webhook_name,
        "Connected to Kubernetes cluster"
    );

    Ok(Reconciler::new(
        config,
        KubeSecretStore::new(client.clone(), config),
        KubeWebhookRegistry::new(client.clone(), config),
        KubeRestartTrigger::new(client, config),
        SystemClock,
    ))
}

fn report(outcome: ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Unchanged => info!("Certificates up to date"),
        ReconcileOutcome::Regenerated(scope) => info!(?scope, "Certificates regenerated"),
        ReconcileOutcome::Restarted => info!("Certificates up to date, pending restart triggered"),
    }
}

async fn run_loop(args: RunArgs) -> Result<(), Error> {
    if args.interval_secs == 0 {
        return Err(Error::ConfigError(
            "interval_secs must be greater than 0".to_string(),
        ));
    }

    info!(
        "Starting webhook-cert-operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let reconciler = build_reconciler(&args.cert).await?;
    let mut interval = tokio::time::interval(Duration::from_secs(args.interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        }

        // Each pass completes before the next tick is awaited
        match reconciler.reconcile().await {
            Ok(outcome) => report(outcome),
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "Reconciliation failed");
            }
        }
    }
}
