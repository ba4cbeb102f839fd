use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::future::FutureExt;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use docgate::client::SubmissionClient;
use docgate::config::DocgateConfig;
use docgate::document::Document;

/// Submit documents to the endpoint without exceeding its rate limit.
#[derive(Debug, Parser)]
#[command(name = "docgate", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signature sent as the Authorization header
    #[arg(long, env = "DOCGATE_CREDENTIAL", hide_env_values = true)]
    credential: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Document JSON files to submit
    #[arg(required = true)]
    documents: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting docgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = DocgateConfig::load(args.config.as_deref())?;
    info!(
        api_url = %config.client.api_url,
        requests_per_unit = config.rate_limit.requests_per_unit,
        unit = %config.rate_limit.unit,
        "Configuration loaded"
    );

    let gate = Arc::new(config.rate_limit.build_gate()?);
    let client = Arc::new(SubmissionClient::from_config(&config.client, gate)?);
    let credential: Arc<str> = args.credential.into();

    // Every pending permit wait gives up once a shutdown signal arrives.
    let shutdown = shutdown_signal().boxed().shared();

    let mut submissions = JoinSet::new();
    for path in args.documents {
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let document = Document::from_json(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;

        let client = Arc::clone(&client);
        let credential = Arc::clone(&credential);
        let shutdown = shutdown.clone();
        submissions.spawn(async move {
            let result = client
                .submit_document_until(&document, &credential, shutdown)
                .await;
            (path, result)
        });
    }

    let mut failed = 0usize;
    let mut submitted = 0usize;
    while let Some(joined) = submissions.join_next().await {
        let (path, result) = joined?;
        match result {
            Ok(()) => {
                submitted += 1;
                info!(path = %path.display(), "Document submitted");
            }
            Err(e) => {
                failed += 1;
                error!(path = %path.display(), error = %e, "Document submission failed");
            }
        }
    }

    info!(submitted, failed, "docgate finished");
    if failed > 0 {
        anyhow::bail!("{} of {} submissions failed", failed, submitted + failed);
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling pending submissions");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling pending submissions");
        }
    }
}
