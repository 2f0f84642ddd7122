mod config;
mod consts;
mod manifest;
mod s3;
mod schema;
mod store;
#[cfg(test)]
mod testutil;
mod tracker;
mod upload;
mod warehouse;
use crate::config::WarehouseArgs;
use crate::s3::{S3Client, S3Location};
use crate::schema::TableSchema;
use crate::store::list_states;
use crate::tracker::LoadTracker;
use crate::warehouse::CredentialRef;
use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::TryStreamExt;
use std::io::{stderr, IsTerminal};
use std::path::PathBuf;
use std::pin::pin;
use time::OffsetDateTime;
use tracing::Level;
use tracing_subscriber::{filter::Targets, fmt::time::OffsetTime, prelude::*};

/// Load CSV files of subreddit posts from S3 into Redshift, loading each file
/// exactly once
///
/// Files that have been loaded are marked with a `status=loaded` S3 object
/// tag; files without that tag are loaded on the next run.
#[derive(Clone, Debug, Parser)]
#[command(version)]
struct Arguments {
    /// Send S3 requests to the given endpoint instead of AWS (e.g., a
    /// LocalStack instance at `http://localhost:4566`)
    #[arg(long, env = "AWS_ENDPOINT_URL", global = true, value_name = "URL")]
    endpoint_url: Option<String>,

    /// Set logging level
    #[arg(
        short,
        long,
        default_value = "DEBUG",
        global = true,
        value_name = "ERROR|WARN|INFO|DEBUG|TRACE"
    )]
    log_level: Level,

    /// AWS region of the S3 bucket.  Defaults to the region from the standard
    /// AWS configuration.
    #[arg(long, env = "AWS_REGION", global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Bulk-load every not-yet-loaded object under a namespace into the
    /// `posts` table and tag each one as loaded
    Load {
        /// ARN of the IAM role Redshift assumes to read from S3
        #[arg(long, env = "REDSHIFT_IAM_ROLE", value_name = "ARN")]
        iam_role: CredentialRef,

        /// Only load objects whose keys match the given regular expression
        #[arg(long, value_name = "REGEX")]
        key_filter: Option<regex::Regex>,

        /// Before loading each object, check that its CSV header matches the
        /// table's columns
        #[arg(long)]
        verify_header: bool,

        #[command(flatten)]
        warehouse: WarehouseArgs,

        /// The bucket and key prefix to load from, in the form
        /// `s3://{bucket}/{prefix}`
        namespace: S3Location,
    },

    /// Upload the files in a local directory to S3 under today's date and
    /// delete the local copies
    Upload {
        /// Directory containing the files to upload
        datadir: PathBuf,

        /// The bucket and key prefix to upload to, in the form
        /// `s3://{bucket}/{prefix}`.  Files are stored at
        /// `{prefix}{yy}/{mm}/{dd}/{filename}`.
        namespace: S3Location,
    },

    /// List the objects under a namespace along with their load states
    Status {
        /// Only list objects whose keys match the given regular expression
        #[arg(long, value_name = "REGEX")]
        key_filter: Option<regex::Regex>,

        /// The bucket and key prefix to list, in the form
        /// `s3://{bucket}/{prefix}`
        namespace: S3Location,
    },
}

impl Arguments {
    async fn get_client(&self) -> S3Client {
        S3Client::new(self.region.clone(), self.endpoint_url.clone()).await
    }
}

// See
// <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/fmt/time/struct.OffsetTime.html#method.local_rfc_3339>
// for an explanation of the main + #[tokio::main]run thing
fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();
    let timer =
        OffsetTime::local_rfc_3339().context("failed to determine local timezone offset")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(timer)
                .with_ansi(stderr().is_terminal())
                .with_writer(stderr),
        )
        .with(
            Targets::new()
                .with_target(env!("CARGO_CRATE_NAME"), args.log_level)
                .with_target("aws_config", Level::DEBUG.min(args.log_level))
                .with_target("sqlx", Level::WARN.min(args.log_level))
                .with_default(Level::INFO.min(args.log_level)),
        )
        .init();
    run(args)
}

#[tokio::main]
async fn run(args: Arguments) -> anyhow::Result<()> {
    let client = args.get_client().await;
    match args.command {
        Command::Load {
            iam_role,
            key_filter,
            verify_header,
            warehouse,
            namespace,
        } => {
            let tracker = LoadTracker::new(client, warehouse.warehouse())
                .with_key_filter(key_filter)
                .with_verify_header(verify_header);
            tracing::info!(%namespace, "Starting load ...");
            let loaded = tracker
                .run(&TableSchema::posts(), &namespace, &iam_role)
                .await?;
            tracing::info!(loaded, "Load complete");
        }
        Command::Upload { datadir, namespace } => {
            let today = OffsetDateTime::now_utc().date();
            let uploaded = upload::upload_dir(&client, &datadir, &namespace, today).await?;
            tracing::info!(uploaded, "Upload complete");
        }
        Command::Status {
            key_filter,
            namespace,
        } => {
            let mut stream = pin!(list_states(&client, &namespace, key_filter.as_ref()));
            while let Some((obj, state)) = stream.try_next().await? {
                println!("{state}\t{obj}");
            }
        }
    }
    Ok(())
}
