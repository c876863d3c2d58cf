//! Site CLI
//!
//! Runs one API intent through the dispatch pipeline against a live API and
//! prints the resulting site state.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gophr_core::environment::SystemClock;
use gophr_core::{intent, Dispatch, Intent, TagRegistry};
use gophr_http::HttpTransport;
use gophr_runtime::metrics::MetricsServer;
use gophr_runtime::{DispatchPipeline, DispatchReceipt, Store};
use gophr_site::{fetch_package, SiteAction, SiteConfig, SiteEnvironment, SiteReducer, SiteState};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type SiteStore = Store<SiteState, SiteAction, SiteEnvironment, SiteReducer>;

const WAIT_LIMIT: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "gophr-site", about = "Query the package site API")]
struct Cli {
    /// API base URL
    #[arg(long, global = true, env = "GOPHR_API_URL")]
    api_url: Option<String>,

    /// Per-call timeout in milliseconds (overrides GOPHR_TRANSPORT_TIMEOUT_MS)
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Skip calls identical to one in flight
    #[arg(long, global = true)]
    dedup: bool,

    /// Install the Prometheus recorder and print metrics on exit
    #[arg(long, global = true)]
    metrics: bool,

    /// Address reported for the metrics recorder
    #[arg(long, global = true, env = "GOPHR_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: SocketAddr,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a package by name, then fetch it again from cache
    Package {
        /// Package name, e.g. `gorilla/mux`
        name: String,
    },
    /// Search packages
    Search {
        /// Search terms
        query: String,
    },
    /// List API tokens of the signed-in account
    Tokens,
}

impl Cli {
    fn config(&self) -> anyhow::Result<SiteConfig> {
        let mut config = SiteConfig::from_env().context("invalid GOPHR_* environment")?;
        if let Some(url) = &self.api_url {
            config.api_url.clone_from(url);
        }
        if let Some(millis) = self.timeout_ms {
            config.transport_timeout = Some(Duration::from_millis(millis));
        }
        if self.dedup {
            config.dedup = gophr_runtime::config::DedupStrategy::InFlight;
        }
        config.metrics |= self.metrics;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gophr_site=debug,gophr_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;

    let mut metrics = MetricsServer::new(cli.metrics_addr);
    if config.metrics {
        metrics.start()?;
    }

    let mut transport = HttpTransport::new(&config.api_url)?;
    if let Some(timeout) = config.transport_timeout {
        transport = transport.with_timeout(timeout)?;
    }
    tracing::info!(api = %transport.base_url(), dedup = ?config.dedup, "Starting site client");

    let pipeline = DispatchPipeline::new()
        .with_transport(transport)
        .with_registry(TagRegistry::from_intents(&Intent::ALL)?)
        .with_config(config.pipeline_config());
    let store = Store::with_pipeline(
        SiteState::default(),
        SiteReducer::new(),
        SiteEnvironment::new(SystemClock),
        pipeline,
    );

    match cli.command {
        Command::Package { name } => {
            run(&store, fetch_package(name.clone()).into()).await?;
            let second = run(&store, fetch_package(name.clone()).into()).await?;
            println!("second fetch: {:?}", second.outcome);

            match store.state(|s| s.packages.get(&name).cloned()).await {
                Some(package) => println!("{}", serde_json::to_string_pretty(&package)?),
                None => println!("package '{name}' not loaded"),
            }
        },
        Command::Search { query } => {
            run(&store, intent::get_packages(json!({ "q": query })).into()).await?;
            let results = store.state(|s| s.search_results.clone()).await;
            println!("{} result(s)", results.len());
            for result in results {
                println!("  {}", result.get("name").unwrap_or(&result));
            }
        },
        Command::Tokens => {
            run(&store, intent::get_tokens().into()).await?;
            let tokens = store.state(|s| s.tokens.clone()).await;
            println!("{}", serde_json::to_string_pretty(&tokens)?);
        },
    }

    let errors = store.state(|s| s.last_error.clone()).await;
    for (resource, error) in &errors {
        eprintln!("{resource}: {error}");
    }

    store.shutdown_default().await?;

    if let Some(text) = metrics.render() {
        println!("\n{text}");
    }

    Ok(())
}

async fn run(store: &SiteStore, value: Dispatch<SiteState, SiteAction>) -> anyhow::Result<DispatchReceipt> {
    let mut receipt = store.dispatch(value).await?;
    receipt
        .handle
        .wait_with_timeout(WAIT_LIMIT)
        .await
        .context("API call did not finish")?;
    Ok(receipt)
}
