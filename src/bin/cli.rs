//! Wayback downloader CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use wayback::{
    error::{AppError, Result},
    logging::{self, StatusLog},
    models::{CdxFilter, Config, DownloadCounters, DownloadRequest, MatchType, PageFilters},
    pipeline::{DownloadPipeline, DownloadSummary},
    storage::SledLedger,
    utils::{CancelToken, MockTransport, ReqwestTransport, Transport},
};

/// Wayback - Website history downloader
#[derive(Parser, Debug)]
#[command(
    name = "wayback",
    version,
    about = "Download the archived history of a website from the Wayback Machine"
)]
struct Cli {
    /// URL whose archived history is downloaded
    match_url: String,

    /// Directory the downloaded pages are written to
    output_dir: PathBuf,

    /// Directory holding the download history (overrides `ledger.dir`)
    #[arg(short = 'd', long)]
    downloads_log_dir: Option<PathBuf>,

    /// How the URL is matched: exact, prefix, host or domain
    #[arg(short, long, default_value = "exact")]
    match_type: String,

    /// Earliest capture timestamp (yyyy[MMddHHmmss])
    #[arg(long)]
    from: Option<i64>,

    /// Latest capture timestamp (yyyy[MMddHHmmss])
    #[arg(long)]
    to: Option<i64>,

    /// Listing filter in the form [!]<field>:<expression>, repeatable
    #[arg(short, long, default_values = ["statuscode:200", "mimetype:text/html"])]
    filters: Vec<String>,

    /// Only keep pages containing one of these terms, repeatable
    #[arg(short, long)]
    page_filters: Vec<String>,

    /// Stop after this many snapshots
    #[arg(long)]
    limit_pages: Option<u64>,

    /// Snapshot requests per second
    #[arg(short, long, default_value_t = 5)]
    rate_limit: u32,

    /// Forget previously downloaded snapshots before starting
    #[arg(long)]
    clear_history: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Serve canned responses instead of contacting the archive
    #[arg(long)]
    use_mock_handler: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log to stderr instead of the status display
    #[arg(long)]
    plain: bool,
}

/// Initialize logging based on the output mode.
fn init_logging(verbose: bool, plain: bool) -> Option<&'static StatusLog> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    if plain {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(level.as_str().to_lowercase()),
        )
        .format_timestamp_secs()
        .init();
        None
    } else {
        Some(logging::init(level))
    }
}

/// Turn the command line into a validated request.
fn build_request(cli: &Cli) -> Result<DownloadRequest> {
    let mut problems = Vec::new();

    let match_type = cli.match_type.parse::<MatchType>().unwrap_or_else(|e| {
        problems.push(describe(e));
        MatchType::default()
    });
    let filters: Vec<CdxFilter> = cli
        .filters
        .iter()
        .filter_map(|raw| match raw.parse::<CdxFilter>() {
            Ok(filter) => Some(filter),
            Err(e) => {
                problems.push(describe(e));
                None
            }
        })
        .collect();

    let mut request = DownloadRequest::new(cli.match_url.clone(), cli.output_dir.clone());
    request.match_type = match_type;
    request.from = cli.from;
    request.to = cli.to;
    request.filters = filters;
    request.limit = cli.limit_pages;
    request.rate_limit = cli.rate_limit;
    request.page_filters = PageFilters::new(cli.page_filters.iter().cloned());
    request.clear_history = cli.clear_history;

    if let Err(e) = request.validate() {
        problems.push(describe(e));
    }
    if problems.is_empty() {
        Ok(request)
    } else {
        Err(AppError::validation(problems.join("\n")))
    }
}

fn describe(error: AppError) -> String {
    match error {
        AppError::Validation(message) => message,
        other => other.to_string(),
    }
}

/// Periodic console output of the status log and live counters.
struct Display {
    status: Option<&'static StatusLog>,
    counters: Arc<DownloadCounters>,
}

impl Display {
    fn refresh(&self) {
        let Some(status) = self.status else {
            return;
        };
        for line in status.drain() {
            println!("{}", line);
        }
        let snapshot = self.counters.snapshot();
        println!(
            "[{}] [PROG] Written: {}, Updated: {}, Skipped: {}",
            chrono::Local::now().format("%H:%M:%S"),
            snapshot.written,
            snapshot.updated,
            snapshot.skipped
        );
    }

    fn flush(&self) {
        if let Some(status) = self.status {
            for line in status.drain() {
                println!("{}", line);
            }
        }
    }
}

/// Cancel `cancel` on Ctrl-C.
fn watch_interrupt(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Cancellation requested, finishing in-flight downloads...");
            cancel.cancel();
        }
    });
}

async fn run(cli: Cli, status: Option<&'static StatusLog>) -> Result<DownloadSummary> {
    let mut config = match &cli.config {
        Some(path) => Config::load_or_default(path),
        None => Config::default(),
    };
    if let Some(dir) = &cli.downloads_log_dir {
        config.ledger.dir = dir.clone();
    }
    config.validate()?;

    let request = build_request(&cli)?;

    log::info!("Match URL: {} ({})", request.match_url, request.match_type);
    log::info!("Output directory: {}", request.output_dir.display());
    log::info!("Download history: {}", config.ledger.dir.display());
    if let Some(from) = request.from {
        log::info!("From: {}", from);
    }
    if let Some(to) = request.to {
        log::info!("To: {}", to);
    }
    for filter in &request.filters {
        log::info!("Filter: {}", filter);
    }
    for term in &cli.page_filters {
        log::info!("Page filter: {}", term);
    }
    if let Some(limit) = request.limit {
        log::info!("Snapshot limit: {}", limit);
    }
    log::info!("Rate limit: {} requests/s", request.rate_limit);

    let transport: Arc<dyn Transport> = if cli.use_mock_handler {
        log::warn!("Using mock transport, no requests reach the archive");
        Arc::new(MockTransport::new())
    } else {
        Arc::new(ReqwestTransport::new(&config.archive)?)
    };
    let ledger = Arc::new(SledLedger::open(&config.ledger.dir)?);

    let pipeline = DownloadPipeline::new(config, transport, ledger);
    let display = Display {
        status,
        counters: pipeline.counters(),
    };

    let cancel = CancelToken::new();
    watch_interrupt(cancel.clone());

    let mut download = std::pin::pin!(pipeline.run(&request, &cancel));
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let result = loop {
        tokio::select! {
            result = &mut download => break result,
            _ = ticker.tick() => display.refresh(),
        }
    };

    display.flush();
    result
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let status = init_logging(cli.verbose, cli.plain);

    log::info!("Wayback downloader starting...");

    match run(cli, status).await {
        Ok(summary) => {
            if summary.cancelled {
                log::warn!("Download cancelled. {}", summary);
            } else {
                log::info!("Done! {}", summary);
            }
            if let Some(status) = status {
                for line in status.drain() {
                    println!("{}", line);
                }
            }
        }
        Err(e) => {
            log::error!("{}", e);
            if let Some(status) = status {
                for line in status.drain() {
                    eprintln!("{}", line);
                }
            }
            std::process::exit(1);
        }
    }
}
