//! Frontier-Bridge main entry point
//!
//! Command-line tool for checking a bridge configuration and exercising the
//! backend, either against an in-memory broker or a real Kafka cluster.

use anyhow::Context;
use clap::{Parser, Subcommand};
use frontier_bridge::backend::{Backend, BatchSource, BrokerBackend};
use frontier_bridge::broker::MemoryBroker;
use frontier_bridge::codec;
use frontier_bridge::config::{load_config_with_hash, Config};
use frontier_bridge::models::{Request, Response};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Frontier-Bridge: a message-broker backend for a crawl frontier
#[derive(Parser, Debug)]
#[command(name = "frontier-bridge")]
#[command(version = "1.0.0")]
#[command(about = "Bridges a crawl frontier and a message broker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print the effective settings
    Check,

    /// Run the backend against an in-memory broker
    Simulate {
        /// Seed URL handed to the backend directly (repeatable)
        #[arg(long = "seed", value_name = "URL")]
        seeds: Vec<String>,

        /// URL published to the todo topic before starting (repeatable)
        #[arg(long = "todo", value_name = "URL")]
        todo: Vec<String>,

        /// Requests asked for per batch
        #[arg(long, default_value_t = 10)]
        batch: usize,
    },

    /// Fetch one batch of requests from the todo topic
    #[cfg(feature = "kafka")]
    Pull {
        /// Maximum number of requests
        #[arg(long, default_value_t = 10)]
        max: usize,
    },

    /// Publish URLs to the todo topic
    #[cfg(feature = "kafka")]
    Push {
        /// URLs to publish
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Simulate { seeds, todo, batch } => {
            handle_simulate(config, seeds, todo, batch).await
        }
        #[cfg(feature = "kafka")]
        Command::Pull { max } => handle_pull(config, max).await,
        #[cfg(feature = "kafka")]
        Command::Push { urls } => handle_push(config, urls).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("frontier_bridge=info,warn"),
            1 => EnvFilter::new("frontier_bridge=debug,info"),
            2 => EnvFilter::new("frontier_bridge=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Keeps the URLs that parse, warning about the rest
fn parse_urls(urls: Vec<String>) -> Vec<Request> {
    urls.into_iter()
        .filter(|raw| match Url::parse(raw) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Skipping invalid URL '{}': {}", raw, e);
                false
            }
        })
        .map(Request::new)
        .collect()
}

/// Handles `check`: prints the validated configuration
fn handle_check(config: &Config) -> anyhow::Result<()> {
    let broker = &config.broker;

    println!("=== Frontier-Bridge Configuration ===\n");
    println!("Broker:");
    println!("  Server: {}", broker.server);
    println!("  Consumer group: {}", broker.group);
    println!("  Todo topic: {}", broker.topic_todo);
    println!("  Done topic: {}", broker.topic_done);
    println!("\nRetries:");
    println!("  Wait time: {}s", broker.wait_time);
    println!("  Max attempts: {}", broker.comm_tries);
    println!(
        "  Worst-case blocking per call: {:.1}s",
        broker.wait_time * f64::from(broker.comm_tries)
    );

    println!("\n✓ Configuration is valid");
    #[cfg(not(feature = "kafka"))]
    println!("  (built without Kafka support: only `simulate` can run)");

    Ok(())
}

/// Handles `simulate`: drives the backend against an in-memory broker
///
/// Every request handed out is reported back as crawled, so the done topic
/// ends up with one event per request.
async fn handle_simulate(
    config: Config,
    seeds: Vec<String>,
    todo: Vec<String>,
    batch: usize,
) -> anyhow::Result<()> {
    let broker = MemoryBroker::new();
    for request in parse_urls(todo) {
        broker.publish(&config.broker.topic_todo, codec::encode_request(&request)?);
    }

    let topic_done = config.broker.topic_done.clone();
    let mut backend = BrokerBackend::new(config.broker, Arc::new(broker.clone())).await;
    backend.start().await;
    backend.add_seeds(parse_urls(seeds));

    let mut handed_out = 0;
    loop {
        let next = backend.next_batch(batch).await;
        if next.requests.is_empty() && next.source != BatchSource::Broker {
            tracing::info!("No more requests ({:?})", next.source);
            break;
        }

        println!("Batch of {} from {:?}:", next.requests.len(), next.source);
        for request in &next.requests {
            println!("  {}", request);
            let response = Response::new(request.clone(), 200);
            if !backend.page_crawled(&response, &[]).await {
                tracing::warn!("Result for {} was not published", request);
            }
        }
        handed_out += next.requests.len();
    }

    backend.stop().await;

    println!(
        "\n✓ {} requests handed out, {} results on {}",
        handed_out,
        broker.messages(&topic_done).len(),
        topic_done
    );

    Ok(())
}

/// Handles `pull`: prints one batch from the todo topic
#[cfg(feature = "kafka")]
async fn handle_pull(config: Config, max: usize) -> anyhow::Result<()> {
    let mut backend = BrokerBackend::connect(config.broker).await?;
    backend.start().await;

    let next = backend.next_batch(max).await;
    for request in &next.requests {
        println!("{}", request);
    }
    tracing::info!("{} requests ({:?})", next.requests.len(), next.source);

    backend.stop().await;
    Ok(())
}

/// Handles `push`: publishes URLs as todo messages
#[cfg(feature = "kafka")]
async fn handle_push(config: Config, urls: Vec<String>) -> anyhow::Result<()> {
    use frontier_bridge::broker::{Broker, KafkaBroker};
    use frontier_bridge::retry::RetryPolicy;
    use std::time::Duration;

    let broker = KafkaBroker::connect(
        &config.broker.server,
        Duration::from_secs(10),
        config.broker.wait(),
    )
    .await?;
    let producer = broker.create_producer().await?;
    let retry = RetryPolicy::from_config(&config.broker);

    let mut published = 0;
    for request in parse_urls(urls) {
        let payload = codec::encode_request(&request)?;
        if retry
            .send(producer.as_ref(), &config.broker.topic_todo, &payload)
            .await
        {
            published += 1;
        } else {
            tracing::error!("Could not publish {}", request);
        }
    }

    producer.flush(Duration::from_secs(10)).await?;
    println!(
        "✓ Published {} URLs to {}",
        published, config.broker.topic_todo
    );
    Ok(())
}
