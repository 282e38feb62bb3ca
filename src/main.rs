use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use postgres_k8s::controller::{
    self,
    context::{Context, OperatorOptions, DEFAULT_FIELD_MANAGER},
    KubeControlPlane, KubeEventRecorder,
};
use postgres_k8s::Error;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version and build information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Upper bound for StatefulSet pods to reach Running after a change
    #[arg(long, env = "READINESS_TIMEOUT_SECS", default_value_t = 600)]
    readiness_timeout_secs: u64,

    /// Interval between pod phase checks while waiting
    #[arg(long, env = "READINESS_POLL_SECS", default_value_t = 2)]
    readiness_poll_secs: u64,

    /// Forwarded to the database container as --enable-analytics
    #[arg(long, env = "ENABLE_ANALYTICS")]
    enable_analytics: bool,

    #[arg(long, env = "ANALYTICS_CLIENT_ID", default_value = "")]
    analytics_client_id: String,

    /// Verbosity passed to the database container as --v=<n>
    #[arg(long, env = "LOG_LEVEL", default_value_t = 3)]
    log_level: u8,

    /// Emit operator logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Field manager recorded on every create and patch
    #[arg(long, env = "FIELD_MANAGER", default_value = DEFAULT_FIELD_MANAGER)]
    field_manager: String,
}

impl RunArgs {
    fn options(&self) -> OperatorOptions {
        OperatorOptions {
            readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
            readiness_poll_interval: Duration::from_secs(self.readiness_poll_secs),
            enable_analytics: self.enable_analytics,
            analytics_client_id: self.analytics_client_id.clone(),
            log_level: self.log_level,
            field_manager: self.field_manager.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Postgres Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    info!("Starting Postgres Operator v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let options = args.options();
    let control_plane = KubeControlPlane::new(
        client.clone(),
        &options.field_manager,
        options.readiness_poll_interval,
    );
    let recorder = KubeEventRecorder::new(client, options.field_manager.clone());
    let ctx = Arc::new(Context::new(control_plane, recorder, options));

    controller::run_controller(ctx).await
}
