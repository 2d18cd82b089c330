//! Batch orchestrator: one extraction session per search term, strictly one
//! page context at a time.

use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::config::{BatchOptions, RevealLimits, Timings};
use crate::delay_manager;
use crate::events::{EventSink, ScrapeEvent};
use crate::exporter::{ExportError, Exporter};
use crate::flight::SingleFlight;
use crate::locators::Locators;
use crate::page::{MapsPage, PageError, PageProvisioner};
use crate::resume_manager::ProgressState;
use crate::search::{self, SearchError};
use crate::session::{ExtractionSession, SessionError};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("a batch is already running")]
    AlreadyRunning,
    #[error("could not spawn batch thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Why one term was abandoned. Never escapes the batch loop.
#[derive(Debug, Error)]
pub enum TermError {
    #[error("could not open page: {0}")]
    Provision(#[source] PageError),
    #[error("page did not load: {0}")]
    Load(#[source] PageError),
    #[error("search failed: {0}")]
    Search(#[from] SearchError),
    #[error("session did not start: {0}")]
    Start(#[from] SessionError),
    #[error("could not spawn session worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchPhase {
    #[default]
    Idle,
    Running,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub current_index: usize,
    pub total: usize,
    pub current_term: String,
    pub phase: BatchPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermOutcome {
    Exported { records: usize, path: PathBuf },
    Empty,
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub terms: Vec<(String, TermOutcome)>,
}

impl BatchSummary {
    pub fn exported(&self) -> usize {
        self.terms
            .iter()
            .filter(|(_, o)| matches!(o, TermOutcome::Exported { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.terms
            .iter()
            .filter(|(_, o)| matches!(o, TermOutcome::Failed(_)))
            .count()
    }
}

/// How a session worker's run ended, as seen from the poll loop.
enum Wait {
    Finished,
    TimedOut,
}

pub struct BatchOrchestrator {
    provisioner: Arc<dyn PageProvisioner>,
    exporter: Arc<dyn Exporter>,
    events: Arc<dyn EventSink>,
    locators: &'static Locators,
    options: BatchOptions,
    timings: Timings,
    limits: RevealLimits,
    flight: SingleFlight,
    progress: Mutex<BatchProgress>,
    ledger: Option<Mutex<ProgressState>>,
}

impl BatchOrchestrator {
    pub fn new(
        provisioner: Arc<dyn PageProvisioner>,
        exporter: Arc<dyn Exporter>,
        events: Arc<dyn EventSink>,
        locators: &'static Locators,
        options: BatchOptions,
        timings: Timings,
        limits: RevealLimits,
    ) -> Self {
        BatchOrchestrator {
            provisioner,
            exporter,
            events,
            locators,
            options,
            timings,
            limits,
            flight: SingleFlight::new(),
            progress: Mutex::new(BatchProgress::default()),
            ledger: None,
        }
    }

    /// Skips terms recorded as finished and records each finished term.
    pub fn with_resume(mut self, ledger: ProgressState) -> Self {
        self.ledger = Some(Mutex::new(ledger));
        self
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_held()
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress_lock().clone()
    }

    fn progress_lock(&self) -> MutexGuard<'_, BatchProgress> {
        match self.progress.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Processes every term in order. A failing term is logged and skipped.
    /// Rejected without side effects while another batch is running.
    pub fn run(&self, terms: &[String]) -> Result<BatchSummary, BatchError> {
        let flight = self.flight.try_acquire().ok_or(BatchError::AlreadyRunning)?;
        let summary = self.process_all(terms);
        drop(flight);
        self.events.emit(ScrapeEvent::BatchComplete);
        Ok(summary)
    }

    /// Runs the batch on its own thread. Returns once the thread has claimed
    /// the flight, or with `AlreadyRunning` if another batch holds it.
    pub fn spawn(self: &Arc<Self>, terms: Vec<String>) -> Result<JoinHandle<BatchSummary>, BatchError> {
        let (claimed_tx, claimed_rx) = mpsc::channel();
        let batch = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("batch".to_string())
            .spawn(move || {
                let Some(flight) = batch.flight.try_acquire() else {
                    let _ = claimed_tx.send(false);
                    return BatchSummary::default();
                };
                let _ = claimed_tx.send(true);
                let summary = batch.process_all(&terms);
                drop(flight);
                batch.events.emit(ScrapeEvent::BatchComplete);
                summary
            })
            .map_err(BatchError::Spawn)?;

        match claimed_rx.recv() {
            Ok(true) => Ok(handle),
            _ => Err(BatchError::AlreadyRunning),
        }
    }

    fn process_all(&self, terms: &[String]) -> BatchSummary {
        let total = terms.len();
        let batch_id = uuid::Uuid::new_v4();
        info!("Starting batch {} with {} terms", batch_id, total);
        {
            let mut progress = self.progress_lock();
            *progress = BatchProgress {
                current_index: 0,
                total,
                current_term: String::new(),
                phase: BatchPhase::Running,
            };
        }

        let mut summary = BatchSummary::default();
        for (i, term) in terms.iter().enumerate() {
            {
                let mut progress = self.progress_lock();
                progress.current_index = i + 1;
                progress.current_term = term.clone();
            }
            self.events.emit(ScrapeEvent::BatchProgress {
                current: i + 1,
                total,
                business_type: term.clone(),
            });

            if self.already_done(term) {
                info!("Skipping '{}', finished in an earlier run", term);
                summary.terms.push((term.clone(), TermOutcome::Skipped));
                continue;
            }

            info!("Processing {} / {} : {}", i + 1, total, term);
            let outcome = match self.process_term(term) {
                Ok(outcome) => {
                    self.mark_done(term);
                    outcome
                }
                Err(e) => {
                    error!("Term '{}' failed: {}", term, e);
                    TermOutcome::Failed(e.to_string())
                }
            };
            summary.terms.push((term.clone(), outcome));

            if i + 1 < total {
                delay_manager::settle(self.timings.inter_term, "next term");
            }
        }

        self.progress_lock().phase = BatchPhase::Complete;
        info!(
            "Batch {} complete: {} exported, {} failed, {} total",
            batch_id,
            summary.exported(),
            summary.failed(),
            total
        );
        summary
    }

    fn ledger_lock(&self) -> Option<MutexGuard<'_, ProgressState>> {
        self.ledger.as_ref().map(|ledger| match ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        })
    }

    fn already_done(&self, term: &str) -> bool {
        self.ledger_lock().map_or(false, |ledger| ledger.contains(term))
    }

    fn mark_done(&self, term: &str) {
        if let Some(mut ledger) = self.ledger_lock() {
            ledger.mark_complete(term);
        }
    }

    fn process_term(&self, term: &str) -> Result<TermOutcome, TermError> {
        let page = self
            .provisioner
            .provision(&self.options.base_url, self.options.tab)
            .map_err(TermError::Provision)?;
        let session = Arc::new(ExtractionSession::new(
            self.locators,
            self.timings,
            self.limits,
            Arc::clone(&self.events),
        ));

        let result = self.drive(term, &page, &session);

        session.cleanup();
        if let Err(e) = page.close() {
            warn!("Could not close page for '{}': {}", term, e);
        }
        result
    }

    fn drive(
        &self,
        term: &str,
        page: &Arc<dyn MapsPage>,
        session: &Arc<ExtractionSession>,
    ) -> Result<TermOutcome, TermError> {
        page.wait_until_loaded().map_err(TermError::Load)?;
        search::accept_consent(page.as_ref(), self.locators, self.timings.consent_settle);
        delay_manager::settle(self.timings.page_init_settle, "application start-up");
        delay_manager::settle(self.timings.host_settle, "session host");

        search::submit_search(page.as_ref(), self.locators, term, self.timings.keystroke)?;
        match search::await_results(page.as_ref(), self.locators, self.options.results_wait, &self.timings) {
            Ok(true) => {}
            Ok(false) => warn!("Results for '{}' did not appear in time", term),
            Err(e) => warn!("Could not check results for '{}': {}", term, e),
        }

        let ticket = session.begin()?;
        let worker_session = Arc::clone(session);
        let worker_page = Arc::clone(page);
        let worker = thread::Builder::new()
            .name(format!("session-{}", term))
            .spawn(move || worker_session.run(ticket, worker_page.as_ref()))
            .map_err(TermError::Spawn)?;

        match self.wait_for_session(session) {
            Wait::Finished => match worker.join() {
                Ok(Ok(count)) => info!("Session for '{}' finished with {} records", term, count),
                Ok(Err(e)) => warn!("Session for '{}' ended with error: {}", term, e),
                Err(_) => error!("Session worker for '{}' panicked", term),
            },
            Wait::TimedOut => warn!(
                "Session for '{}' still running after {} s, moving on",
                term,
                self.timings.term_ceiling.as_secs()
            ),
        }

        let records = session.get_data();
        if records.is_empty() {
            info!("No records for '{}', nothing to export", term);
            return Ok(TermOutcome::Empty);
        }
        let path = self.exporter.export(Some(term), &records)?;
        Ok(TermOutcome::Exported {
            records: records.len(),
            path,
        })
    }

    fn wait_for_session(&self, session: &ExtractionSession) -> Wait {
        let deadline = Instant::now() + self.timings.term_ceiling;
        loop {
            if !session.phase().is_active() {
                return Wait::Finished;
            }
            if Instant::now() >= deadline {
                return Wait::TimedOut;
            }
            delay_manager::poll_interval(self.timings.state_poll);
        }
    }
}
