use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use open_data_export::request::{DumpArgs, ExportArgs, FilterArgs};
use open_data_export::{
    dispatch, DestinationKind, ExportFormat, ExportWorker, Request, Response, WorkKind,
};

#[derive(Parser)]
#[command(
    name = "open-data-export",
    about = "Export OpenAQ measurements as per location/day open data files"
)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Config {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_WRITE_URL")]
    database_url: String,

    /// Bucket holding the open data archive
    #[arg(long, env = "OPEN_DATA_BUCKET")]
    bucket: Option<String>,

    /// Output format: csv, csv.gz or parquet
    #[arg(long, env = "WRITE_FILE_FORMAT", default_value = "csv.gz")]
    format: ExportFormat,

    /// Write location: s3 or local
    #[arg(long, env = "WRITE_FILE_LOCATION", default_value = "s3")]
    location: DestinationKind,

    /// Root directory for the local write location
    #[arg(long, env = "LOCAL_SAVE_DIRECTORY")]
    local_root: Option<PathBuf>,

    /// How many units to process concurrently
    #[arg(long, env = "EXPORT_CONCURRENCY")]
    concurrency: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Export pending location days
    Export {
        #[arg(long, default_value_t = 500)]
        limit: i64,
    },
    /// Re-export location days recorded with an outdated format version
    Outdated {
        #[arg(long, default_value_t = 500)]
        limit: i64,
    },
    /// Relocate exported files from the legacy layout to the canonical one
    Move {
        #[arg(long, default_value_t = 500)]
        limit: i64,
        #[arg(long)]
        location_id: Option<i32>,
        #[arg(long)]
        day: Option<NaiveDate>,
    },
    /// Verify and repair the visibility of exported files
    Check {
        #[arg(long, default_value_t = 500)]
        limit: i64,
        #[arg(long)]
        location_id: Option<i32>,
        #[arg(long)]
        day: Option<NaiveDate>,
    },
    /// Export one location day regardless of queue state
    Dump {
        #[arg(long)]
        location_id: i32,
        #[arg(long)]
        day: NaiveDate,
    },
    /// Report database time and ledger totals
    Ping,
    /// Reset the export log, requeueing every location day
    Reset,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let fmt_layer = tracing_subscriber::fmt::layer();
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    let cli = Cli::parse();

    let mut options = ExportWorker::options()
        .database_url(&cli.config.database_url)
        .format(cli.config.format)
        .destination(cli.config.location);

    if let Some(bucket) = &cli.config.bucket {
        options = options.bucket(bucket);
    }
    if let Some(local_root) = &cli.config.local_root {
        options = options.local_root(local_root.clone());
    }
    if let Some(concurrency) = cli.config.concurrency {
        options = options.concurrency(concurrency);
    }

    let worker = options.init().await?;

    match cli.command {
        Command::Export { limit } => {
            let response = dispatch(&worker, Request::Export(ExportArgs { limit })).await?;
            print_response(&response)?;
        }
        Command::Outdated { limit } => {
            let processed = worker.run(WorkKind::Outdated, limit).await?;
            println!("{processed}");
        }
        Command::Move {
            limit,
            location_id,
            day,
        } => {
            let request = Request::Move(FilterArgs {
                limit,
                location_id,
                day,
            });
            let response = dispatch(&worker, request).await?;
            print_response(&response)?;
        }
        Command::Check {
            limit,
            location_id,
            day,
        } => {
            let request = Request::Check(FilterArgs {
                limit,
                location_id,
                day,
            });
            let response = dispatch(&worker, request).await?;
            print_response(&response)?;
        }
        Command::Dump { location_id, day } => {
            let response = dispatch(&worker, Request::Dump(DumpArgs { location_id, day })).await?;
            print_response(&response)?;
        }
        Command::Ping => {
            let response = dispatch(&worker, Request::Ping).await?;
            print_response(&response)?;
        }
        Command::Reset => {
            let requeued = worker.reset().await?;
            println!("{requeued}");
        }
    }

    Ok(())
}

fn print_response(response: &Response) -> Result<(), Box<dyn std::error::Error>> {
    match response {
        Response::Count(count) => println!("{count}"),
        Response::Status(status) => println!("{status}"),
    }
    Ok(())
}
