use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use umbra::reader::PolicyReader;
use umbra::settings::Settings;
use umbra::{reload, storage};

#[derive(Parser, Debug)]
#[command(name = "umbra", version, about = "Tag-based access policy engine")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the policy file and synchronize the store
    Sync {
        /// Policy file to load, overriding the configured path
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show a tag's definition status and public flag
    Tag { name: String },
    /// List the scopes a user holds on a tag
    Scopes {
        tag: String,
        user: String,
        #[arg(long)]
        json: bool,
    },
    /// List every tag reachable from the public sentinel
    Public {
        #[arg(long)]
        json: bool,
    },
    /// List the tags granting a scope to a user
    Granting {
        scope: String,
        user: String,
        #[arg(long)]
        json: bool,
    },
    /// Check whether a user owns a tag
    Owner { tag: String, user: String },
    /// Show recent synchronization runs
    Runs {
        #[arg(short, long, default_value_t = 10)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    match cli.command {
        Command::Sync { file } => {
            let db = storage::init(&settings.database).await?;
            let path = file.unwrap_or_else(|| settings.policy.path.clone());
            let report = reload::reload_from_file(&db, &path, settings.policy.max_depth).await?;
            println!(
                "Synchronized {} tags, {} users, {} scopes; {} grants, {} owners (+{}, -{})",
                report.tags,
                report.users,
                report.scopes,
                report.grants,
                report.owners,
                report.added,
                report.removed
            );
        }
        Command::Tag { name } => {
            let reader = PolicyReader::connect(&settings.database.url).await?;
            if reader.is_tag_defined(&name).await? {
                let public = reader.is_tag_public(&name).await?;
                println!("{} ({})", name, if public { "public" } else { "private" });
            } else {
                println!("{name} is not defined");
            }
        }
        Command::Scopes { tag, user, json } => {
            let reader = PolicyReader::connect(&settings.database.url).await?;
            let scopes = reader.get_scopes_for_tag_and_user(&tag, &user).await?;
            print_names(&scopes, json)?;
        }
        Command::Public { json } => {
            let reader = PolicyReader::connect(&settings.database.url).await?;
            let tags = reader.get_public_tags().await?;
            print_names(&tags, json)?;
        }
        Command::Granting { scope, user, json } => {
            let reader = PolicyReader::connect(&settings.database.url).await?;
            let tags = reader.get_tags_granting_scope(&scope, &user).await?;
            print_names(&tags, json)?;
        }
        Command::Owner { tag, user } => {
            let reader = PolicyReader::connect(&settings.database.url).await?;
            println!("{}", reader.is_tag_owner(&tag, &user).await?);
        }
        Command::Runs { limit } => {
            let db = storage::init(&settings.database).await?;
            for run in storage::recent_sync_runs(&db, limit).await? {
                let started = chrono::DateTime::from_timestamp(run.started_at, 0)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| run.started_at.to_string());
                let status = match run.success {
                    Some(0) => "failed",
                    Some(_) => "ok",
                    None => "running",
                };
                let error = run
                    .error_message
                    .as_deref()
                    .map(|m| format!(" error: {m}"))
                    .unwrap_or_default();
                println!(
                    "#{} {} {} records={}{}",
                    run.id,
                    started,
                    status,
                    run.records_processed.unwrap_or(0),
                    error
                );
            }
        }
    }

    Ok(())
}

fn print_names(names: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(names).into_diagnostic()?);
    } else if names.is_empty() {
        println!("(none)");
    } else {
        for name in names {
            println!("{name}");
        }
    }
    Ok(())
}
