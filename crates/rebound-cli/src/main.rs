//! rebound CLI
//!
//! - `run`: in-memory のデモ。タスクを投入し、全件が終端状態になるまでワーカーを回す
//! - `submit`: gateway に 1 件投入してレスポンスを表示
//! - `backoff`: リトライ回数ごとの遅延範囲を表示

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use rebound_core::app::AppBuilder;
use rebound_core::config::Config;
use rebound_core::impls::{
    InMemoryQueueTransport, InMemoryTaskStore, SimulatedExecutor, SimulationSettings,
};
use rebound_core::observability::init_tracing;
use rebound_core::ports::{Clock, SystemClock};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Task lifecycle and retry orchestration demo
#[derive(Parser)]
#[command(name = "rebound")]
#[command(about = "Run and inspect the rebound task engine in memory", long_about = None)]
struct Cli {
    /// JSON config file (defaults + environment overrides when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit tasks and process them until every one is terminal
    Run {
        /// Number of tasks to submit
        #[arg(short, long, default_value_t = 10)]
        tasks: usize,

        /// Orchestrator workers on the main queue
        #[arg(short, long)]
        workers: Option<usize>,

        /// Multiplier for queue delays and simulated latency (1.0 = real time)
        #[arg(long, default_value_t = 0.01)]
        time_scale: f64,

        /// Probability that one attempt fails
        #[arg(long)]
        failure_rate: Option<f64>,
    },

    /// Submit one raw request body and print the gateway response
    Submit {
        /// Request body, e.g. '{"taskId":"t-1","payload":{}}'
        body: String,
    },

    /// Print the retry delay range for each retry count
    Backoff {
        /// Highest retry count to show
        #[arg(long, default_value_t = 10)]
        max_retry_count: u32,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            tasks,
            workers,
            time_scale,
            failure_rate,
        } => {
            if let Some(workers) = workers {
                config.worker.concurrency = workers;
            }
            if let Some(rate) = failure_rate {
                config.executor.failure_rate = rate;
            }
            init_tracing(&config.log);
            run(config, tasks, time_scale).await
        }
        Commands::Submit { body } => {
            init_tracing(&config.log);
            submit(config, &body).await
        }
        Commands::Backoff { max_retry_count } => {
            backoff(&config, max_retry_count);
            Ok(())
        }
    }
}

async fn run(config: Config, tasks: usize, time_scale: f64) -> CliResult<()> {
    if !(time_scale.is_finite() && time_scale >= 0.0) {
        return Err(format!("time scale must be a non-negative number, got {time_scale}").into());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryTaskStore::new(Arc::clone(&clock)));
    let transport = Arc::new(
        InMemoryQueueTransport::new(Arc::clone(&clock))
            .with_time_scale(time_scale)
            .with_history_limit(0),
    );
    let settings = SimulationSettings {
        time_scale,
        ..SimulationSettings::from(&config.executor)
    };
    let executor = Arc::new(SimulatedExecutor::new(settings, Arc::clone(&clock)));

    let app = AppBuilder::new(config)
        .store(store.clone())
        .transport(transport.clone())
        .executor(executor)
        .clock(clock)
        .build()?;

    for index in 0..tasks {
        let body = json!({
            "taskId": format!("task-{index:04}"),
            "payload": {"index": index},
        });
        let receipt = app.gateway.submit(&body.to_string()).await?;
        info!(task_id = %receipt.task_id, message_id = %receipt.message_id, "submitted");
    }

    let workers = app.spawn_workers(transport.clone());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                warn!("interrupted; shutting down before all tasks finished");
                break;
            }
            _ = ticker.tick() => {
                let counts = store.counts().await;
                info!(
                    completed = counts.completed,
                    retry_scheduled = counts.retry_scheduled,
                    dead_letter = counts.dead_letter,
                    terminal = counts.terminal(),
                    total = counts.total(),
                    "progress"
                );
                if counts.terminal() >= tasks {
                    break;
                }
            }
        }
    }

    workers.shutdown_and_join().await;

    let counts = store.counts().await;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

async fn submit(config: Config, body: &str) -> CliResult<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app = AppBuilder::new(config)
        .store(Arc::new(InMemoryTaskStore::new(Arc::clone(&clock))))
        .transport(Arc::new(InMemoryQueueTransport::new(Arc::clone(&clock))))
        .executor(Arc::new(SimulatedExecutor::new(
            SimulationSettings::default(),
            Arc::clone(&clock),
        )))
        .clock(clock)
        .build()?;

    let (status, response) = app.gateway.submit_response(body).await;
    println!("{status}");
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn backoff(config: &Config, max_retry_count: u32) {
    let policy = &config.retry.backoff;
    println!(
        "max retries: {} (base={}, cap={}s, jitter={})",
        config.retry.max_retries, policy.base, policy.max_delay_secs, policy.jitter_ratio
    );
    for retry_count in 1..=max_retry_count {
        let (low, high) = policy.bounds(retry_count);
        let marker = if retry_count >= config.retry.max_retries {
            " (dead-letter)"
        } else {
            ""
        };
        println!(
            "retry {retry_count:>2}: {}..{}s{marker}",
            low.as_secs(),
            high.as_secs()
        );
    }
}
