//! worksync CLI - keep local working copies in step with their remotes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use worksync::dispatch::default_commit_message;
use worksync::{Dispatcher, EnvSecretStore, Registry, Settings};

#[derive(Parser)]
#[command(name = "worksync")]
#[command(about = "Clone, pull and push local working copies of git remotes", long_about = None)]
struct Cli {
    /// Data directory holding settings, metadata and checkouts
    #[arg(short, long, default_value = ".worksync")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a remote repository
    Add {
        /// Remote address (https:// or a local path)
        remote: String,
        /// Repository id (defaults to the remote's name)
        #[arg(long)]
        id: Option<String>,
        /// Branch to clone (defaults to the remote's HEAD)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Forget a repository
    Remove {
        id: String,
        /// Also delete the local checkout
        #[arg(long)]
        delete: bool,
    },

    /// List registered repositories
    List,

    /// Clone a registered repository
    Clone { id: String },

    /// Fetch and fast-forward
    Pull { id: String },

    /// Commit the whole working tree and push it
    Push {
        id: String,
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Pull, then commit and push
    Sync {
        id: String,
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Show branch, tip and change count
    Status {
        id: String,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List files changed since the last sync
    Changes { id: String },

    /// Check that checkouts still exist, resetting state for missing ones
    Validate { id: Option<String> },

    /// Run a trigger URL and print the callback URL
    Trigger { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.root)?;
    let registry = Registry::open(&cli.root);

    match cli.command {
        Commands::Add { remote, id, branch } => {
            add_repository(&registry, &remote, id.as_deref(), branch.as_deref()).await
        }
        Commands::Remove { id, delete } => {
            registry.unregister(&id, delete).await?;
            println!("Repository '{}' removed.", id);
            Ok(())
        }
        Commands::List => list_repositories(&registry).await,
        Commands::Clone { id } => clone_repository(&registry, &settings, &id).await,
        Commands::Pull { id } => pull_repository(&registry, &settings, &id).await,
        Commands::Push { id, message } => {
            push_repository(&registry, &settings, &id, message).await
        }
        Commands::Sync { id, message } => {
            sync_repository(&registry, &settings, &id, message).await
        }
        Commands::Status { id, json } => show_status(&registry, &id, json).await,
        Commands::Changes { id } => show_changes(&registry, &id).await,
        Commands::Validate { id } => validate(&registry, id.as_deref()).await,
        Commands::Trigger { url } => run_trigger(&registry, &settings, &url).await,
    }
}

async fn add_repository(
    registry: &Registry,
    remote: &str,
    id: Option<&str>,
    branch: Option<&str>,
) -> anyhow::Result<()> {
    let handle = registry.register(id, remote, branch).await?;
    println!("Registered '{}' -> {}", handle.id, handle.remote_url);
    println!("Checkout: {}", handle.local_path.display());
    Ok(())
}

async fn list_repositories(registry: &Registry) -> anyhow::Result<()> {
    let handles = registry.list().await?;
    if handles.is_empty() {
        println!("No repositories registered.");
        return Ok(());
    }

    println!("Repositories:");
    for handle in handles {
        let state = registry.state(&handle.id).await?;
        let tip = if state.is_empty() {
            "not cloned".to_string()
        } else {
            format!(
                "{} @ {}",
                state.branch_or_default(),
                trigger::short_sha(&state.commit_id)
            )
        };
        println!("  {} ({}) [{}]", handle.id, handle.remote_url, tip);
    }
    Ok(())
}

async fn clone_repository(
    registry: &Registry,
    settings: &Settings,
    id: &str,
) -> anyhow::Result<()> {
    let credentials = settings.credentials(&EnvSecretStore)?;
    println!("Cloning '{}'...", id);
    let outcome = registry.clone(id, credentials, settings.timeouts()).await?;
    println!(
        "Cloned {} file(s) on {} at {}",
        outcome.file_count,
        outcome.branch,
        trigger::short_sha(&outcome.commit_id)
    );
    Ok(())
}

async fn pull_repository(registry: &Registry, settings: &Settings, id: &str) -> anyhow::Result<()> {
    let credentials = settings.credentials(&EnvSecretStore)?;
    let outcome = registry.pull(id, credentials, settings.timeouts()).await?;
    if outcome.updated {
        println!("Updated to {}", trigger::short_sha(&outcome.new_commit_id));
    } else {
        println!("Already up to date.");
    }
    Ok(())
}

async fn push_repository(
    registry: &Registry,
    settings: &Settings,
    id: &str,
    message: Option<String>,
) -> anyhow::Result<()> {
    let credentials = settings.credentials(&EnvSecretStore)?;
    let message = message.unwrap_or_else(default_commit_message);
    match registry
        .commit_and_push(id, &message, settings.author(), credentials, settings.timeouts())
        .await
    {
        Ok(outcome) => {
            println!("Pushed {}", trigger::short_sha(&outcome.new_commit_id));
            Ok(())
        }
        Err(e) if e.is_benign() => {
            println!("Nothing to commit.");
            Ok(())
        }
        Err(e) => Err(report(e)),
    }
}

async fn sync_repository(
    registry: &Registry,
    settings: &Settings,
    id: &str,
    message: Option<String>,
) -> anyhow::Result<()> {
    let credentials = settings.credentials(&EnvSecretStore)?;
    let message = message.unwrap_or_else(default_commit_message);
    let outcome = registry
        .sync(id, &message, settings.author(), credentials, settings.timeouts())
        .await
        .map_err(report)?;

    if outcome.pull.updated {
        println!("Pulled {}", trigger::short_sha(&outcome.pull.new_commit_id));
    }
    match &outcome.push {
        Some(push) => println!("Pushed {}", trigger::short_sha(&push.new_commit_id)),
        None => println!("Nothing to commit."),
    }
    Ok(())
}

async fn show_status(registry: &Registry, id: &str, json: bool) -> anyhow::Result<()> {
    let status = registry.status(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Repository: {}", id);
    println!("Branch:     {}", status.branch);
    println!("Commit:     {}", trigger::short_sha(&status.commit_id));
    match status.change_count {
        0 => println!("\nNo uncommitted changes."),
        n => println!("\n{} uncommitted change(s).", n),
    }
    Ok(())
}

async fn show_changes(registry: &Registry, id: &str) -> anyhow::Result<()> {
    let changes = registry.refresh_changes(id).await?;
    if changes.is_empty() {
        println!("No changes since the last sync.");
        return Ok(());
    }

    for path in &changes.added {
        println!("  A {}", path);
    }
    for path in &changes.modified {
        println!("  M {}", path);
    }
    for path in &changes.deleted {
        println!("  D {}", path);
    }
    println!("({} change(s))", changes.count());
    Ok(())
}

async fn validate(registry: &Registry, id: Option<&str>) -> anyhow::Result<()> {
    let results = match id {
        Some(id) => vec![(id.to_string(), registry.validate(id).await?)],
        None => registry.validate_all().await?,
    };

    for (id, cloned) in results {
        let label = if cloned { "ok" } else { "not cloned" };
        println!("  {}: {}", id, label);
    }
    Ok(())
}

async fn run_trigger(registry: &Registry, settings: &Settings, url: &str) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::new(registry, settings, &EnvSecretStore);
    let callback = dispatcher.handle_url(url).await?;
    println!("{}", callback);
    Ok(())
}

/// Attach the remediation hint to an operation error
fn report(err: worksync::Error) -> anyhow::Error {
    match err.suggestion() {
        Some(hint) => anyhow::anyhow!("{} ({})", err, hint),
        None => err.into(),
    }
}
