use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hostdiff_common::{
    default_cache_dir, ensure_config, load_config, profile_cache_file, AppConfig, CancelToken, HostDiffError,
    RemoteClient,
};
use hostdiff_core::{
    AssetCache, DiffFormatter, HostingDir, JsonLinesFormatter, ManifestClient, ProgressSink,
    ReconcileOptions, ReconcileReport, ReconciliationEngine, RemoteSnapshotAdapter,
    TextFormatter,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_ERROR: i32 = 1;
const EXIT_FINGERPRINT_FAILURES: i32 = 3;
const EXIT_CANCELLED: i32 = 130;

const IDENTICAL_MESSAGE: &str = "Deployed app is identical to proposed version";
const CHANGES_MESSAGE: &str = "The following reflects the proposed changes to your app";

#[derive(Parser)]
#[command(name = "hostdiff")]
#[command(author = "hostdiff Contributors")]
#[command(version)]
#[command(about = "Preview what deploying an app would change in its hosted assets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare local hosting assets with the deployed app
    Diff(DiffArgs),

    /// Inspect or clear the per-profile asset cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Write the config file with defaults if missing and print its path
    Config,
}

#[derive(Args)]
struct DiffArgs {
    /// Local app directory (hosting files live under hosting/files)
    #[arg(short, long)]
    local: PathBuf,

    /// JSON manifest describing the deployed state
    #[arg(short, long)]
    remote: PathBuf,

    /// App id; optional when the manifest holds a single app
    #[arg(short, long)]
    app: Option<String>,

    /// Group (project) id of the app
    #[arg(short, long, default_value = "")]
    group: String,

    /// Exclude patterns, gitignore syntax (can be specified multiple times)
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Profile whose asset cache is used
    #[arg(long)]
    profile: Option<String>,

    /// Cache directory override
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Re-hash every file instead of trusting cached fingerprints
    #[arg(long)]
    verify: bool,

    /// Also list unchanged files
    #[arg(long)]
    all: bool,

    /// Output one JSON object per line
    #[arg(long)]
    json: bool,

    /// Fingerprinting threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Include dot-files and dot-directories
    #[arg(long)]
    include_hidden: bool,

    /// Do not follow symbolic links
    #[arg(long)]
    no_follow_symlinks: bool,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the cache location and entry counts
    Info(CacheArgs),

    /// Delete cached fingerprints
    Clear(CacheArgs),
}

#[derive(Args)]
struct CacheArgs {
    /// Profile whose cache is used
    #[arg(long)]
    profile: Option<String>,

    /// Cache directory override
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Only this app's entries
    #[arg(short, long)]
    app: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    // JSON goes to stdout; keep stderr quiet unless RUST_LOG says otherwise
    let json = match &cli.command {
        Commands::Diff(args) => args.json,
        Commands::Cache { action } => match action {
            CacheAction::Info(args) | CacheAction::Clear(args) => args.json,
        },
        Commands::Config => false,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(if json { "warn" } else { "info" })),
        )
        .init();

    let result = match cli.command {
        Commands::Diff(args) => run_diff(args),
        Commands::Cache { action } => run_cache(action).map(|_| 0),
        Commands::Config => run_config().map(|_| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if e
                .downcast_ref::<HostDiffError>()
                .map_or(false, HostDiffError::is_cancelled)
            {
                error!("Diff cancelled");
                std::process::exit(EXIT_CANCELLED);
            }
            error!("{:#}", e);
            std::process::exit(EXIT_ERROR);
        }
    }
}

fn run_diff(args: DiffArgs) -> Result<i32> {
    let loaded = load_config(false)?;
    let mut config = loaded.config;
    apply_diff_overrides(&mut config, &args);

    let hosting = HostingDir::find(&args.local)
        .with_context(|| format!("Failed to load app at {}", args.local.display()))?;
    let metadata = hosting.load_metadata()?;

    let client = ManifestClient::load(&args.remote)?;
    let app_id = resolve_app_id(&client, args.app.as_deref(), &args.group)?;
    info!("Comparing {} with deployed app {}", args.local.display(), app_id);

    let remote = RemoteSnapshotAdapter::adapt(client.hosting_assets(&args.group, &app_id)?)?;

    let cache_dir = match config.cache_dir.clone() {
        Some(path) => path,
        None => default_cache_dir(loaded.portable, &loaded.path)?,
    };
    let cache_file = profile_cache_file(&cache_dir, &config.profile)?;
    info!("Using asset cache: {}", cache_file.display());
    let cache = AssetCache::open(&cache_file, app_id.as_str());

    let cancel = match args.timeout {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    };
    install_interrupt_handler(&cancel);

    let options = ReconcileOptions {
        metadata,
        include_unchanged: args.all,
        ..ReconcileOptions::from_config(&config)
    };
    let mut engine = ReconciliationEngine::new(options);
    if !args.json && std::io::stderr().is_terminal() {
        engine = engine.with_progress(Arc::new(ProgressReporter::new()));
    }

    let outcome = engine.reconcile(hosting.files_dir(), &cache, &remote, &cancel);
    if let Err(e) = cache.close() {
        warn!("Failed to persist asset cache: {}", e);
    }
    let report = outcome?;

    print_report(&report, args.json);
    info!(
        "{} files scanned, {} from cache, {} hashed, {} pruned",
        report.stats.scanned, report.stats.cache_hits, report.stats.cache_misses, report.stats.pruned
    );

    if report.failures.is_empty() {
        Ok(0)
    } else {
        warn!("{} files could not be fingerprinted", report.failures.len());
        Ok(EXIT_FINGERPRINT_FAILURES)
    }
}

fn apply_diff_overrides(config: &mut AppConfig, args: &DiffArgs) {
    config.exclude_patterns.extend(args.exclude.iter().cloned());
    if args.include_hidden {
        config.include_hidden = true;
    }
    if args.no_follow_symlinks {
        config.follow_symlinks = false;
    }
    if args.verify {
        config.verify_content = true;
    }
    if let Some(workers) = args.workers {
        config.workers = Some(workers);
    }
    if let Some(profile) = args.profile.clone() {
        config.profile = profile;
    }
    if let Some(cache_dir) = args.cache_dir.clone() {
        config.cache_dir = Some(cache_dir);
    }
}

/// Pick the app to compare against; an empty group matches any group.
fn resolve_app_id(client: &ManifestClient, app: Option<&str>, group: &str) -> Result<String> {
    if let Some(app) = app {
        return Ok(app.to_string());
    }

    let candidates: Vec<&str> = client
        .apps()
        .iter()
        .filter(|a| group.is_empty() || a.group_id == group)
        .map(|a| a.app_id.as_str())
        .collect();
    match candidates.as_slice() {
        [only] => Ok(only.to_string()),
        [] => bail!("No app found in the remote manifest"),
        many => bail!(
            "Remote manifest holds several apps ({}); choose one with --app",
            many.join(", ")
        ),
    }
}

fn install_interrupt_handler(cancel: &CancelToken) {
    let cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
        warn!("Failed to install Ctrl+C handler: {}", e);
    }
}

fn print_report(report: &ReconcileReport, json: bool) {
    if json {
        for line in JsonLinesFormatter.format(report) {
            println!("{line}");
        }
        return;
    }

    if !report.has_changes() && report.failures.is_empty() {
        println!("{IDENTICAL_MESSAGE}");
    } else {
        println!("{CHANGES_MESSAGE}");
    }
    for line in TextFormatter.format(report) {
        println!("{line}");
    }
}

/// Fingerprinting progress on stderr
struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} Fingerprinting [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        Self { bar }
    }
}

impl ProgressSink for ProgressReporter {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_file(&self, _path: &str) {
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn run_config() -> Result<()> {
    let loaded = ensure_config(false)?;
    if !loaded.exists {
        info!("Created config file with defaults");
    }
    println!("{}", loaded.path.display());
    Ok(())
}

#[derive(Serialize)]
struct CacheInfo {
    cache_file: String,
    exists: bool,
    scopes: Vec<ScopeInfo>,
}

#[derive(Serialize)]
struct ScopeInfo {
    app: String,
    entries: usize,
}

fn run_cache(action: CacheAction) -> Result<()> {
    let (args, clear) = match action {
        CacheAction::Info(args) => (args, false),
        CacheAction::Clear(args) => (args, true),
    };

    let loaded = load_config(false)?;
    let profile = args.profile.clone().unwrap_or(loaded.config.profile.clone());
    let cache_dir = match args.cache_dir.clone().or(loaded.config.cache_dir.clone()) {
        Some(path) => path,
        None => default_cache_dir(loaded.portable, &loaded.path)?,
    };
    let cache_file = profile_cache_file(&cache_dir, &profile)?;
    let exists = cache_file.exists();

    let mut cache = AssetCache::open(&cache_file, args.app.clone().unwrap_or_default());
    if clear {
        match &args.app {
            Some(app) => {
                let removed = cache.len();
                cache.clear();
                info!("Removed {} cached entries for app {}", removed, app);
            }
            None => {
                cache.clear_all();
                info!("Cleared asset cache {}", cache_file.display());
            }
        }
        cache.close().context("Failed to write asset cache")?;
        return Ok(());
    }

    let scopes: Vec<ScopeInfo> = cache
        .scope_sizes()
        .into_iter()
        .filter(|(scope, _)| args.app.as_ref().map_or(true, |app| app == scope))
        .map(|(app, entries)| ScopeInfo { app, entries })
        .collect();
    drop(cache);

    if args.json {
        let info = CacheInfo {
            cache_file: cache_file.display().to_string(),
            exists,
            scopes,
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Cache file: {}", cache_file.display());
    if !exists {
        println!("  (not created yet)");
    }
    for scope in &scopes {
        println!("  {:<40} {} entries", scope.app, scope.entries);
    }
    Ok(())
}
