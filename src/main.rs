use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ara_queue_service::config::Settings;
use ara_queue_service::error::{self, AppError};
use ara_queue_service::metrics::encode_metrics;
use ara_queue_service::queue::{
    create_priority_queue_backend, create_queue_backend, FileQueueBackend, Message,
    PriorityQueueService, QueueService, SystemClock,
};
use ara_queue_service::redis::RedisPool;
use ara_queue_service::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "ara-queue", version, about = "At-least-once message queue CLI")]
struct Cli {
    /// Print Prometheus metrics for this run to stderr when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a message
    Push {
        /// Queue locator, e.g. a queue URL or a bare name
        locator: String,

        /// Message body
        body: String,

        /// Push to the priority queue with this rank (lower first)
        #[arg(long, allow_negative_numbers = true)]
        rank: Option<i32>,
    },

    /// Pull one message and print `<receipt>\t<body>`
    Pull {
        locator: String,

        /// Pull from the priority queue
        #[arg(long)]
        priority: bool,
    },

    /// Delete a delivered message by its receipt
    Delete {
        locator: String,

        /// Receipt printed by `pull`
        receipt: String,

        /// Delete from the priority queue
        #[arg(long)]
        priority: bool,
    },

    /// Remove every message from a file-backed queue
    Purge { locator: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::new().context("failed to load settings")?;
    init_tracing(&settings.log);
    tracing::debug!(?settings, "Configuration loaded");

    match cli.command {
        Commands::Push { locator, body, rank } => match rank {
            Some(rank) => {
                priority_queue(&settings).await?.push(&locator, &body, rank).await?;
            }
            None => {
                fifo_queue(&settings)?.push(&locator, &body).await?;
            }
        },
        Commands::Pull { locator, priority } => {
            let message = if priority {
                priority_queue(&settings).await?.pull(&locator).await?
            } else {
                fifo_queue(&settings)?.pull(&locator).await?
            };
            if let Some(message) = message {
                print_message(&message);
            }
        }
        Commands::Delete {
            locator,
            receipt,
            priority,
        } => {
            if priority {
                priority_queue(&settings).await?.delete(&locator, &receipt).await?;
            } else {
                fifo_queue(&settings)?.delete(&locator, &receipt).await?;
            }
        }
        Commands::Purge { locator } => {
            if settings.queue.backend != "file" {
                return Err(AppError::Validation(
                    "purge is only supported by the file backend".to_string(),
                )
                .into());
            }
            let backend = FileQueueBackend::new(settings.queue.backend_config())?;
            backend.purge(&locator).await?;
        }
    }

    if cli.metrics {
        eprint!("{}", encode_metrics()?);
    }

    Ok(())
}

fn fifo_queue(settings: &Settings) -> error::Result<Arc<dyn QueueService>> {
    if settings.queue.fifo_is_process_local() {
        tracing::warn!("queue.backend is memory: messages are lost when this command exits");
    }
    Ok(create_queue_backend(&settings.queue, Arc::new(SystemClock))?)
}

async fn priority_queue(settings: &Settings) -> error::Result<Arc<dyn PriorityQueueService>> {
    let redis_pool = if settings.queue.priority_is_process_local() {
        tracing::warn!(
            "queue.priority_backend is memory: messages are lost when this command exits"
        );
        None
    } else {
        let pool = RedisPool::new(settings.redis.clone())?;
        pool.ping().await?;
        Some(Arc::new(pool))
    };

    Ok(create_priority_queue_backend(
        &settings.queue,
        &settings.redis,
        redis_pool,
        Arc::new(SystemClock),
    ))
}

fn print_message(message: &Message) {
    println!("{}\t{}", message.receipt_id(), message.body());
}
