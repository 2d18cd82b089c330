use maps_scraper_lib::config::{ResultsWait, TabMode};
use maps_scraper_lib::events::LogSink;
use maps_scraper_lib::locators::Locators;
use maps_scraper_lib::page::MapsPage;
use maps_scraper_lib::resume_manager::PROGRESS_FILE;
use maps_scraper_lib::{browser, delay_manager, input_loader, logger, search};
use maps_scraper_lib::{
    BatchOrchestrator, ChromeProvisioner, Columns, CsvExporter, Exporter, ExtractionSession, ProgressState,
    ScraperConfig, TermOutcome,
};

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use std::error::Error;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(name = "maps_scraper", version, about = "Scrape business listings from map search results")]
struct Cli {
    /// JSON config file; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// One extraction run. Press Enter to pause or resume.
    Scrape {
        /// Free-text search
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        query: Option<String>,
        /// An already-built results page
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, value_enum)]
        columns: Option<ColumnsArg>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
    /// One extraction run per term in a CSV or Excel file
    Batch {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip terms finished by an earlier run
        #[arg(long)]
        resume: bool,
        /// Bring each new tab to the front
        #[arg(long)]
        foreground: bool,
        #[arg(long, value_enum)]
        wait: Option<WaitArg>,
        #[arg(long, value_enum)]
        columns: Option<ColumnsArg>,
        #[arg(long)]
        headed: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ColumnsArg {
    Full,
    Compact,
}

impl From<ColumnsArg> for Columns {
    fn from(arg: ColumnsArg) -> Self {
        match arg {
            ColumnsArg::Full => Columns::Full,
            ColumnsArg::Compact => Columns::Compact,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WaitArg {
    Polled,
    Fixed,
}

impl From<WaitArg> for ResultsWait {
    fn from(arg: WaitArg) -> Self {
        match arg {
            WaitArg::Polled => ResultsWait::Polled,
            WaitArg::Fixed => ResultsWait::Fixed,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logger::init(cli.verbose);
    info!("Starting Maps Scraper...");

    let mut config = ScraperConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Scrape {
            query,
            url,
            out,
            columns,
            headed,
        } => {
            apply_overrides(&mut config, out, columns, headed);
            scrape(&config, query, url)
        }
        Command::Batch {
            input,
            out,
            resume,
            foreground,
            wait,
            columns,
            headed,
        } => {
            apply_overrides(&mut config, out, columns, headed);
            if foreground {
                config.batch.tab = TabMode::Foreground;
            }
            if let Some(wait) = wait {
                config.batch.results_wait = wait.into();
            }
            batch(&config, input, resume)
        }
    }
}

fn apply_overrides(config: &mut ScraperConfig, out: Option<PathBuf>, columns: Option<ColumnsArg>, headed: bool) {
    if let Some(out) = out {
        config.output_dir = out;
    }
    if let Some(columns) = columns {
        config.columns = columns.into();
    }
    if headed {
        config.browser.headless = false;
    }
}

fn scrape(config: &ScraperConfig, query: Option<String>, url: Option<String>) -> Result<(), Box<dyn Error>> {
    let target = match (&url, &query) {
        (Some(url), _) => url.clone(),
        (None, Some(query)) => browser::search_url(query),
        (None, None) => return Err("either --query or --url is required".into()),
    };

    let provisioner = ChromeProvisioner::launch(&config.browser)?;
    let page: Arc<dyn MapsPage> = Arc::new(provisioner.open(&target, TabMode::Foreground)?);
    page.wait_until_loaded()?;
    search::accept_consent(page.as_ref(), &Locators::GOOGLE_MAPS, config.timings.consent_settle);
    delay_manager::settle(config.timings.page_init_settle, "page load");

    let session = Arc::new(ExtractionSession::new(
        &Locators::GOOGLE_MAPS,
        config.timings,
        config.limits,
        Arc::new(LogSink),
    ));
    let ticket = session.begin()?;

    let worker_session = Arc::clone(&session);
    let worker_page = Arc::clone(&page);
    let worker = thread::Builder::new()
        .name("session".to_string())
        .spawn(move || worker_session.run(ticket, worker_page.as_ref()))?;

    // Detached: blocks on stdin until the process exits.
    let pauser = Arc::clone(&session);
    thread::spawn(move || {
        for _ in std::io::stdin().lock().lines() {
            pauser.toggle_pause();
        }
    });
    info!("Press Enter to pause or resume.");

    let outcome = worker.join().map_err(|_| "session worker panicked")?;
    let records = session.get_data();
    if let Err(e) = page.close() {
        warn!("Could not close page: {}", e);
    }
    let count = outcome?;

    if records.is_empty() {
        warn!("No records extracted, nothing to export.");
        return Ok(());
    }
    let exporter = CsvExporter::new(&config.output_dir, config.columns);
    let path = exporter.export(query.as_deref(), &records)?;
    info!("Scraping Completed. {} records written to {:?}", count, path);
    Ok(())
}

fn batch(config: &ScraperConfig, input: PathBuf, resume: bool) -> Result<(), Box<dyn Error>> {
    let terms = input_loader::load_terms(&input);
    if terms.is_empty() {
        error!(
            "No search terms found in {:?}. Expected one term per line under a '{}' header.",
            input,
            input_loader::HEADER_LABEL
        );
        return Ok(());
    }

    let provisioner = Arc::new(ChromeProvisioner::launch(&config.browser)?);
    let exporter = Arc::new(CsvExporter::new(&config.output_dir, config.columns));
    let mut orchestrator = BatchOrchestrator::new(
        provisioner,
        exporter,
        Arc::new(LogSink),
        &Locators::GOOGLE_MAPS,
        config.batch.clone(),
        config.timings,
        config.limits,
    );
    if resume {
        orchestrator = orchestrator.with_resume(ProgressState::load(config.output_dir.join(PROGRESS_FILE)));
    }

    let summary = orchestrator.run(&terms)?;
    for (term, outcome) in &summary.terms {
        match outcome {
            TermOutcome::Exported { records, path } => info!("{}: {} records -> {:?}", term, records, path),
            TermOutcome::Empty => info!("{}: no results", term),
            TermOutcome::Skipped => info!("{}: skipped (already done)", term),
            TermOutcome::Failed(reason) => warn!("{}: failed ({})", term, reason),
        }
    }
    info!(
        "Batch Completed. {} of {} terms exported, {} failed.",
        summary.exported(),
        terms.len(),
        summary.failed()
    );
    Ok(())
}
