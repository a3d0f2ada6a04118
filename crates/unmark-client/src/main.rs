use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use unmark_client::{
    init_tracing, ApiClient, ClientConfig, ClientContext, FileIdentityProvider, LocalClient,
};
use unmark_core::ReplicateTransformer;
use unmark_shared::constants::DEFAULT_HISTORY_PAGE;
use unmark_shared::protocol::EntryView;
use unmark_shared::{EntryId, HistoryEntry, SystemClock, UnmarkError};
use unmark_store::Database;

#[derive(Parser)]
#[command(name = "unmark")]
#[command(about = "Remove watermarks from images, five a day")]
#[command(version)]
struct Cli {
    /// Directory for the device database and identity token
    #[arg(long, env = "UNMARK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Server used by `remote` commands
    #[arg(long, env = "UNMARK_SERVER_URL", global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process an image on this device
    Process { file: PathBuf },
    /// List processed images, newest first
    History(PageArgs),
    /// Write a processed image to a file
    Export { id: String, path: PathBuf },
    /// Show how many images can still be processed today
    Quota,
    /// Talk to an Unmark server
    #[command(subcommand)]
    Remote(RemoteCommand),
    /// Sharing is only available through a server
    Share { id: String },
}

#[derive(Subcommand)]
enum RemoteCommand {
    /// Register this device and show quota with recent history
    Session,
    /// Upload an image for processing
    Process {
        file: PathBuf,
        /// Recorded in history instead of the file name
        #[arg(long)]
        source: Option<String>,
    },
    /// List processed images, newest first
    History(PageArgs),
    /// Publish an entry under a short link
    Share { id: String },
    /// Show the public feed
    Feed,
}

#[derive(clap::Args)]
struct PageArgs {
    #[arg(long, default_value_t = DEFAULT_HISTORY_PAGE)]
    limit: u32,
    #[arg(long, default_value_t = 0)]
    offset: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(server) = cli.server {
        config.server_url = server.trim_end_matches('/').to_string();
    }

    match cli.command {
        Command::Process { file } => {
            let processed = open_local(&config)?.process_file(&file).await?;
            println!("{}", processed.entry.id);
            println!("Remaining today: {}", processed.remaining_today);
        }
        Command::History(page) => {
            let client = open_local(&config)?;
            println!("Remaining today: {}", client.remaining_today().await?);
            for entry in client.history(page.limit, page.offset).await? {
                print_local_entry(&entry);
            }
        }
        Command::Export { id, path } => {
            let id = parse_entry_id(&id)?;
            let written = open_local(&config)?.export(id, &path).await?;
            println!("Wrote {written} bytes to {}", path.display());
        }
        Command::Quota => {
            let remaining = open_local(&config)?.remaining_today().await?;
            println!("Remaining today: {remaining}");
        }
        Command::Share { .. } => return Err(UnmarkError::Unsupported.into()),
        Command::Remote(command) => run_remote(&config, command).await?,
    }
    Ok(())
}

fn open_local(config: &ClientConfig) -> anyhow::Result<LocalClient> {
    let path = config.database_path();
    let db = Database::open_at(&path).with_context(|| format!("opening {}", path.display()))?;
    let transformer = Arc::new(ReplicateTransformer::new(config.replicate.clone()));
    Ok(LocalClient::new(db, transformer, Arc::new(SystemClock)))
}

async fn run_remote(config: &ClientConfig, command: RemoteCommand) -> anyhow::Result<()> {
    let mut ctx = ClientContext::new(
        ApiClient::new(&config.server_url),
        FileIdentityProvider::new(config.identity_path()),
    );

    match command {
        RemoteCommand::Session => {
            let session = ctx.session().await?;
            println!("Identity: {}", session.identity);
            println!("Remaining today: {}", session.remaining_today);
            for entry in &session.history {
                print_remote_entry(entry);
            }
        }
        RemoteCommand::Process { file, source } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let source = source.unwrap_or_else(|| {
                file.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let processed = ctx.process(bytes, &source).await?;
            println!("{}", processed.entry_id);
            println!("{}", processed.result_url);
            println!("Remaining today: {}", processed.remaining_today);
        }
        RemoteCommand::History(page) => {
            for entry in ctx.history(page.limit, page.offset).await? {
                print_remote_entry(&entry);
            }
        }
        RemoteCommand::Share { id } => {
            let shared = ctx.share(parse_entry_id(&id)?).await?;
            println!("{}", shared.share_url);
        }
        RemoteCommand::Feed => {
            for entry in ctx.public_feed().await? {
                print_remote_entry(&entry);
            }
        }
    }
    Ok(())
}

fn parse_entry_id(raw: &str) -> anyhow::Result<EntryId> {
    EntryId::parse(raw).map_err(|_| UnmarkError::NotFound.into())
}

fn print_local_entry(entry: &HistoryEntry) {
    println!(
        "{}  {}  {}",
        entry.id,
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.source_reference
    );
}

fn print_remote_entry(entry: &EntryView) {
    let visibility = match &entry.share_slug {
        Some(slug) => format!("public:{slug}"),
        None => "private".to_string(),
    };
    println!(
        "{}  {}  {}  {}  {}",
        entry.id,
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        visibility,
        entry.source_reference,
        entry.result_url.as_deref().unwrap_or("-"),
    );
}
