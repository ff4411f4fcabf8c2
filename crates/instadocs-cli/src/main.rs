use anyhow::Context;
use clap::Parser;
use instadocs_api::{ClientSecrets, GoogleAuthClient};
use instadocs_core::models::{CopyReport, DocInfo, DownloadReport};
use instadocs_core::title::unique_folder_name;
use instadocs_core::{
    Config, ConsentFlow, CopyOptions, CredentialStore, DriveProvider, Exporter,
    InstapaperProvider, Pipeline, TitleStyle,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "instadocs")]
#[command(version, about = "Re-order the Google Docs in an Instapaper folder by date", long_about = None)]
struct Cli {
    /// Config file (TOML, or legacy config.json)
    #[arg(long, global = true, env = "INSTADOCS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Recreate a folder's Google Docs in a new folder, oldest first
    Sort {
        /// Source Instapaper folder
        folder: String,
        /// Target folder; a unique "<folder>-xxxx" name when omitted
        #[arg(long)]
        target: Option<String>,
        /// full, title-only, title-author or title-date
        #[arg(long)]
        title_style: Option<TitleStyle>,
        /// Pause between bookmark creations
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Show what would be added without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a folder's Google Docs sorted by date
    List {
        folder: String,
        /// Also write the list to a .json, .csv or .md file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Save every Google Doc in a folder as a .docx file
    Download { folder: String, save_dir: PathBuf },
    /// Authorize Google Drive access now
    Auth,
    /// Show or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print where the config file is read from
    Path,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "instadocs=info,instadocs_core=info,instadocs_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };

    run(cli.command, &config_path).await
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = if path.exists() {
        tracing::debug!("Loading config from {}", path.display());
        Config::load_from(path)?
    } else {
        Config::default()
    };
    config.apply_env();
    Ok(config)
}

async fn run(command: Commands, config_path: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Sort {
            folder,
            target,
            title_style,
            delay_ms,
            dry_run,
        } => {
            let config = load_config(config_path)?;
            let target = target.unwrap_or_else(|| unique_folder_name(&folder));
            let options = CopyOptions {
                title_style: title_style.unwrap_or(config.copy.title_style),
                delay: Duration::from_millis(delay_ms.unwrap_or(config.copy.delay_ms)),
                dry_run,
            };

            let pipeline = connect(&config).await?;
            let report = pipeline.copy(&folder, &target, &options).await?;
            print_copy_report(&report);
        }
        Commands::List { folder, export } => {
            let config = load_config(config_path)?;
            let pipeline = connect(&config).await?;
            let collected = pipeline.sorted_docs(&folder).await?;

            print_docs(&collected.docs);
            for (url, reason) in &collected.skipped {
                println!("  skipped {}: {}", url, reason);
            }

            if let Some(path) = export {
                Exporter::export_to_file(&collected.docs, &path)?;
                println!("Exported {} docs to {}", collected.docs.len(), path.display());
            }
        }
        Commands::Download { folder, save_dir } => {
            let config = load_config(config_path)?;
            let pipeline = connect(&config).await?;
            let report = pipeline.download(&folder, &save_dir).await?;
            print_download_report(&report);
        }
        Commands::Auth => {
            let config = load_config(config_path)?;
            let store = CredentialStore::new(config.authorized_user_path()?);
            let auth = GoogleAuthClient::new().with_retry_config(config.retry.clone());
            authorize(&config, &store, &auth).await?;
            println!("Google credentials saved to {}", store.path().display());
        }
        Commands::Config { action } => run_config(action, config_path)?,
    }

    Ok(())
}

fn run_config(action: ConfigAction, path: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Path => {
            let state = if path.exists() { "" } else { " (not created yet)" };
            println!("{}{}", path.display(), state);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists; pass --force to overwrite it",
                    path.display()
                );
            }
            Config::default().save_to(path)?;
            println!("Wrote default config to {}", path.display());
        }
    }
    Ok(())
}

/// Log in to Instapaper and get a Drive token, running consent if needed
async fn connect(config: &Config) -> anyhow::Result<Pipeline> {
    let credentials = config.instapaper_credentials()?;
    let bookmarks = InstapaperProvider::connect(
        &credentials,
        &config.instapaper.api_url,
        config.copy.bookmark_limit,
        config.retry.clone(),
    )
    .await?;

    let auth = GoogleAuthClient::new().with_retry_config(config.retry.clone());
    let store = CredentialStore::new(config.authorized_user_path()?);
    let token = match store.access_token(&auth).await? {
        Some(token) => token,
        None => {
            authorize(config, &store, &auth).await?;
            store
                .access_token(&auth)
                .await?
                .context("Google authorization did not produce an access token")?
        }
    };

    Ok(Pipeline::new(
        Box::new(bookmarks),
        Box::new(DriveProvider::new(token, config.retry.clone())),
    ))
}

/// Run the browser consent flow and persist the result
async fn authorize(
    config: &Config,
    store: &CredentialStore,
    auth: &GoogleAuthClient,
) -> anyhow::Result<()> {
    let secrets_path = &config.google.credentials_path;
    let contents = std::fs::read_to_string(secrets_path).with_context(|| {
        format!(
            "Could not read Google client secrets from {} (download them from the Cloud console)",
            secrets_path.display()
        )
    })?;
    let secrets = ClientSecrets::from_json(&contents)?;

    let flow = ConsentFlow::start(secrets).await?;
    if flow.open_browser() {
        println!("Opened your browser to authorize Google Drive access.");
        println!("If nothing happened, visit:\n\n  {}\n", flow.authorization_url());
    } else {
        println!("Visit this URL to authorize Google Drive access:\n\n  {}\n", flow.authorization_url());
    }

    let user = flow.finish(auth).await?;
    store.save(&user)?;
    Ok(())
}

fn print_docs(docs: &[DocInfo]) {
    if docs.is_empty() {
        println!("No Google Docs found.");
        return;
    }

    for doc in docs {
        println!("{}  {} - {}", doc.date_label(), doc.title, doc.owner);
        println!("            {}", doc.url);
    }
}

fn print_copy_report(report: &CopyReport) {
    if report.dry_run {
        println!(
            "Dry run: {} bookmarks would be added to '{}'",
            report.planned.len(),
            report.target_folder
        );
        for planned in &report.planned {
            println!("  {}", planned.title);
        }
        return;
    }

    println!(
        "Found {} Google Docs in '{}' ({} skipped)",
        report.found, report.source_folder, report.skipped
    );
    if report.created_folder {
        println!("Created folder '{}'", report.target_folder);
    }
    println!("Added {} bookmarks to '{}'", report.added, report.target_folder);

    if let Ok(json) = serde_json::to_string(report) {
        tracing::debug!("Copy report: {}", json);
    }
}

fn print_download_report(report: &DownloadReport) {
    for path in &report.saved {
        println!("Saved {}", path.display());
    }
    for (url, reason) in &report.failed {
        println!("Failed {}: {}", url, reason);
    }
    println!("{} saved, {} failed", report.saved.len(), report.failed.len());
}
