use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "bizdash")]
#[command(about = "Bizdash - business dashboard state and sync engine", long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List slices, or print one slice as JSON
    Show {
        slice: Option<String>,
    },
    /// Set fields of one record (FIELD=VALUE, VALUE parsed as JSON when possible)
    Edit {
        slice: String,
        key: String,
        #[arg(required = true)]
        patches: Vec<String>,
    },
    /// Create a record
    Insert {
        slice: String,
        key: String,
        fields: Vec<String>,
    },
    /// Delete a record
    Delete { slice: String, key: String },
    /// Synchronize with the sheet service
    Sync {
        /// Keep running and sync periodically until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Inspect or restore the snapshot audit trail
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
}

#[derive(Subcommand)]
enum AuditAction {
    /// List retained snapshot versions
    List,
    /// Commit the slices of a retained version as the newest snapshot
    Restore { version: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = commands::context::App::open(cli.config).await?;

    match cli.command {
        Commands::Show { slice } => commands::show::run(&app, slice.as_deref())?,
        Commands::Edit {
            slice,
            key,
            patches,
        } => commands::edit::edit(&app, &slice, &key, &patches).await?,
        Commands::Insert { slice, key, fields } => {
            commands::edit::insert(&app, &slice, &key, &fields).await?
        }
        Commands::Delete { slice, key } => commands::edit::delete(&app, &slice, &key).await?,
        Commands::Sync { watch } => {
            if watch {
                commands::sync::watch(&app).await?
            } else {
                commands::sync::once(&app).await?
            }
        }
        Commands::Audit { action } => match action {
            AuditAction::List => commands::audit::list(&app)?,
            AuditAction::Restore { version } => commands::audit::restore(&app, version).await?,
        },
    }

    Ok(())
}
