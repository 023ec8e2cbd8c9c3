//! Squall CLI: run one ingestion job from the command line.
//!
//! The flags mirror the trigger fields, so a command-line invocation builds
//! the same payload an HTTP trigger would deliver.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

use squall::feeds::{Feed, FlightsFeed, IncidentsFeed, QuotesFeed, VaccinationsFeed};
use squall::sink::store::StoreBackend;
use squall::sink::{BlobStore, MemoryBus, MessageBus, RestBus, SinkSet, StorePool};
use squall::source::http::HttpClient;
use squall::{pipeline, TriggerPayload};

#[derive(Parser)]
#[command(name = "squall", version, about = "Feed ingestion with sink fan-out")]
struct CliArgs {
    #[command(subcommand)]
    feed: FeedCommand,

    /// Raw trigger message as JSON; overrides the individual flags.
    #[arg(long)]
    message: Option<String>,

    /// Bucket where data is to be stored.
    #[arg(long)]
    bucket: Option<String>,

    /// Path within the bucket.
    #[arg(long)]
    path: Option<String>,

    /// Project that owns the pub/sub topic.
    #[arg(long)]
    project_id: Option<String>,

    /// Pub/sub topic to publish to.
    #[arg(long)]
    topic: Option<String>,

    /// Store records as objects.
    #[arg(long)]
    storage: bool,

    /// Publish records to the message bus.
    #[arg(long)]
    pubsub: bool,

    /// Maximum number of records to deliver.
    #[arg(long)]
    limit: Option<usize>,

    /// One object/message per record instead of one per batch.
    #[arg(long)]
    separate_lines: bool,

    /// Place output under a timestamped path segment.
    #[arg(long)]
    add_timestamp: bool,

    /// Storage backend bucket names resolve against.
    #[arg(long, value_enum, default_value = "local")]
    backend: Backend,

    /// Root directory for the local storage backend.
    #[arg(long, default_value = ".")]
    storage_root: PathBuf,

    /// Capture publishes in memory instead of posting to the bus endpoint.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Local,
    Gcs,
    S3,
}

#[derive(Subcommand)]
enum FeedCommand {
    /// Daily quote bars for a set of ticker symbols.
    Quotes {
        /// Comma-separated ticker symbols.
        #[arg(long)]
        symbols: Option<String>,
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        interval: Option<String>,
    },
    /// Live flight state vectors.
    Flights,
    /// Traffic incidents inside a bounding box.
    Incidents {
        #[arg(long)]
        key: Option<String>,
        /// minLat,minLong,maxLat,maxLong
        #[arg(long)]
        bounds: Option<String>,
        #[arg(long)]
        filters: Option<String>,
    },
    /// Vaccination rows from a delimited file in the bucket.
    Vaccinations {
        #[arg(long)]
        input_path: Option<String>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

/// Build the trigger payload a hosting event system would have delivered.
fn build_payload(args: &CliArgs) -> TriggerPayload {
    if let Some(raw) = &args.message {
        let mut query = Map::new();
        query.insert("message".to_string(), Value::String(raw.clone()));
        return TriggerPayload {
            query: Some(query),
            body: None,
        };
    }

    let mut body = Map::new();
    let mut set = |name: &str, value: Value| {
        body.insert(name.to_string(), value);
    };
    if args.storage {
        set("storage", Value::Bool(true));
    }
    if args.pubsub {
        set("pubsub", Value::Bool(true));
    }
    if let Some(bucket) = &args.bucket {
        set("bucket", Value::String(bucket.clone()));
    }
    if let Some(path) = &args.path {
        set("path", Value::String(path.clone()));
    }
    if let Some(project) = &args.project_id {
        set("projectId", Value::String(project.clone()));
    }
    if let Some(topic) = &args.topic {
        set("topic", Value::String(topic.clone()));
    }
    if let Some(limit) = args.limit {
        set("limit", Value::from(limit));
    }
    if args.separate_lines {
        set("separateLines", Value::Bool(true));
    }
    if args.add_timestamp {
        set("addTimestamp", Value::Bool(true));
    }

    match &args.feed {
        FeedCommand::Quotes {
            symbols,
            period,
            interval,
        } => {
            if let Some(symbols) = symbols {
                set("symbols", Value::String(symbols.clone()));
            }
            if let Some(period) = period {
                set("period", Value::String(period.clone()));
            }
            if let Some(interval) = interval {
                set("interval", Value::String(interval.clone()));
            }
        }
        FeedCommand::Flights => {}
        FeedCommand::Incidents {
            key,
            bounds,
            filters,
        } => {
            if let Some(key) = key {
                set("key", Value::String(key.clone()));
            }
            if let Some(bounds) = bounds {
                set("bounds", Value::String(bounds.clone()));
            }
            if let Some(filters) = filters {
                set("filters", Value::String(filters.clone()));
            }
        }
        FeedCommand::Vaccinations { input_path } => {
            if let Some(input) = input_path {
                set("inputPath", Value::String(input.clone()));
            }
        }
    }

    TriggerPayload::from_body(Value::Object(body))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();
    let payload = build_payload(&args);

    let store: Arc<dyn BlobStore> = Arc::new(StorePool::new(match args.backend {
        Backend::Local => StoreBackend::Local {
            root: args.storage_root.clone(),
        },
        Backend::Gcs => StoreBackend::Gcs,
        Backend::S3 => StoreBackend::S3,
    }));
    let bus: Arc<dyn MessageBus> = if args.dry_run {
        Arc::new(MemoryBus::new())
    } else {
        Arc::new(RestBus::from_env())
    };
    let sinks = SinkSet::new(Some(store.clone()), Some(bus));

    let http = HttpClient::new();
    let feed: Box<dyn Feed> = match &args.feed {
        FeedCommand::Quotes { .. } => Box::new(QuotesFeed::new(http)),
        FeedCommand::Flights => Box::new(FlightsFeed::new(http)),
        FeedCommand::Incidents { .. } => Box::new(IncidentsFeed::new(http)),
        FeedCommand::Vaccinations { .. } => Box::new(VaccinationsFeed::new(store)),
    };

    info!("Starting {} ingestion run", feed.name());
    match pipeline::run(&payload, feed.as_ref(), &sinks).await {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
