use anyhow::Context;
use clap::Parser;
use glaceon::{upload_batch, AwsCliTransport, UploadConfig};
use indicatif::HumanBytes;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "glaceon")]
#[command(about = "Upload large files to an archival vault with tree-hash verification", long_about = None)]
#[command(version)]
struct Args {
    /// Files to upload, relative to the working directory
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Vault receiving the archives
    #[arg(long)]
    vault: Option<String>,

    /// Directory files are resolved against
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Account owning the vault ("-" for the current credentials)
    #[arg(long)]
    account_id: Option<String>,

    /// Use the relative path instead of the file name as archive description
    #[arg(long)]
    with_path: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> anyhow::Result<UploadConfig> {
    let mut config = match &args.config {
        Some(path) => UploadConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => UploadConfig::default(),
    };

    if let Some(vault) = &args.vault {
        config.vault = vault.clone();
    }
    if let Some(work_dir) = &args.work_dir {
        config.work_dir = work_dir.clone();
    }
    if let Some(account_id) = &args.account_id {
        config.account_id = account_id.clone();
    }
    if args.with_path {
        config.with_path = true;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("glaceon={}", log_level))
        .init();

    let config = load_config(&args)?;

    info!("🚀 Glaceon - archival vault uploader");
    info!("Vault: {}", config.vault);
    info!("Working directory: {:?}", config.work_dir);

    let mut bytes_total = 0;
    for file in &args.files {
        match std::fs::metadata(config.work_dir.join(file)) {
            Ok(metadata) => bytes_total += metadata.len(),
            Err(e) => warn!("Cannot stat {}: {}", file.display(), e),
        }
    }
    info!("Total: {} in {} files", HumanBytes(bytes_total), args.files.len());

    let transport = AwsCliTransport::new(&config);
    match upload_batch(&transport, &config, &args.files, bytes_total).await {
        Ok(reports) => {
            info!("✅ Uploaded {} archives successfully!", reports.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}
