//! replica-client
//!
//! Command line front end for the cluster client.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    CLUSTER CLIENT                    │
//!                 │                                                      │
//!  request ───────┼─▶ http::pipeline ─▶ load_balancer ─▶ replica N       │
//!                 │        ▲                 ▲                           │
//!                 │        │ mark unhealthy  │ health flags              │
//!                 │        └──────────── health::prober ◀── interval     │
//!                 │                                                      │
//!  watch ─────────┼─▶ realtime::session ─▶ ws candidate i (STOMP)        │
//!                 │        rotate on failure, replay subscriptions       │
//!                 │                                                      │
//!                 │  config · observability · resilience · lifecycle     │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

use replica_client::config::loader::load_config;
use replica_client::http::ApiRequest;
use replica_client::lifecycle::signals::shutdown_on_ctrl_c;
use replica_client::observability::{logging, metrics};
use replica_client::realtime::Payload;
use replica_client::{ClientConfig, ClusterClient, Shutdown, Strategy};

#[derive(Parser)]
#[command(name = "replica-client")]
#[command(about = "Load-balanced client for a replicated backend cluster", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one request through the load balancer
    Request {
        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Logical path, e.g. /api/auctions/active
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Probe every endpoint once and print the health table
    Health,
    /// Show or change the load balancing strategy
    Strategy {
        #[command(subcommand)]
        action: StrategyAction,
    },
    /// Subscribe to destinations and print incoming messages
    Watch {
        #[arg(required = true)]
        destinations: Vec<String>,
    },
    /// Run health probing and print state changes until Ctrl+C
    Monitor,
}

#[derive(Subcommand)]
enum StrategyAction {
    Get,
    /// round-robin | least-connections
    Set { strategy: Strategy },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "replica-client starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut client = ClusterClient::new(config)?;

    match cli.command {
        Commands::Request { method, path, data } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            let mut request = ApiRequest::new(method, path);
            if let Some(data) = data {
                request = request.json(serde_json::from_str(&data)?);
            }
            let response = client.execute(request).await?;
            print_response(response).await?;
        }
        Commands::Health => {
            client.prober().probe_all().await;
            println!("{}", serde_json::to_string_pretty(&client.health_snapshot())?);
        }
        Commands::Strategy { action } => match action {
            StrategyAction::Get => println!("{}", client.strategy()),
            StrategyAction::Set { strategy } => {
                client.set_strategy(strategy)?;
                println!("{}", strategy);
            }
        },
        Commands::Watch { destinations } => {
            let shutdown = Shutdown::new();
            let mut stop = shutdown.subscribe();
            tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

            let session = client.session().clone();
            for destination in destinations {
                let label = destination.clone();
                session
                    .subscribe(destination, move |payload| match payload {
                        Payload::Json(value) => println!("{label}: {value}"),
                        Payload::Raw(text) => println!("{label}: {text}"),
                    })
                    .await?;
            }
            session.connect().await?;

            stop.recv().await.ok();
            session.disconnect().await?;
        }
        Commands::Monitor => {
            let shutdown = Shutdown::new();
            let mut stop = shutdown.subscribe();
            client.start(&shutdown)?;
            tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

            let mut ticker = tokio::time::interval(Duration::from_secs(
                client.config().health_check.interval_secs.max(1),
            ));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tracing::info!(
                            strategy = %client.strategy(),
                            available = ?client.available_endpoints(),
                            "Cluster status"
                        );
                    }
                    _ = stop.recv() => break,
                }
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        eprintln!("Response: {}", text);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
