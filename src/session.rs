//! Extraction session: the lifecycle of one scrape against one page context.
//!
//! ```text
//! Idle -> Running -> Complete | Error
//!         Running <-> Paused
//! ```
//!
//! All state sits behind one mutex. `begin` is the compare-and-set that lets
//! at most one run exist per session. Each run carries the epoch it started
//! in; `cleanup` bumps the epoch, and a worker holding a stale epoch stops at
//! its next checkpoint without touching state again.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::config::{RevealLimits, Timings};
use crate::delay_manager;
use crate::events::{EventSink, ScrapeEvent};
use crate::extractor::Extractor;
use crate::locators::Locators;
use crate::page::{ItemHandle, MapsPage, PageError};
use crate::record::{Extraction, Record};
use crate::revealer::{Checkpoint, ListRevealer, RevealExit};

const STATUS_READY: &str = "Ready to scrape";
const STATUS_SCROLLING: &str = "Scrolling to load all results...";
const STATUS_IN_PROGRESS: &str = "Scraping in progress...";
const STATUS_PAUSED: &str = "Paused";
const STATUS_COMPLETED: &str = "Scraping completed!";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Scraping already in progress")]
    AlreadyRunning,
    #[error("Could not find results container. Make sure you are on a Google Maps search page.")]
    ContainerNotFound,
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("session was reset while running")]
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Running,
    Paused,
    Complete,
    Error,
}

impl Phase {
    /// A run exists and has not finished.
    pub fn is_active(self) -> bool {
        matches!(self, Phase::Running | Phase::Paused)
    }
}

#[derive(Debug)]
struct SessionState {
    phase: Phase,
    records: Vec<Record>,
    cursor: usize,
    status: String,
    error: Option<String>,
    epoch: u64,
}

impl SessionState {
    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.records.clear();
        self.cursor = 0;
        self.status = STATUS_READY.to_string();
        self.error = None;
    }
}

/// Read-only view returned by `get_state`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub count: usize,
    pub data: Vec<Record>,
    pub is_active: bool,
    pub is_paused: bool,
    pub status: String,
    pub error: Option<String>,
}

/// Proof that `begin` succeeded. Consumed by `run`.
#[derive(Debug)]
pub struct RunTicket {
    epoch: u64,
}

pub struct ExtractionSession {
    state: Mutex<SessionState>,
    locators: &'static Locators,
    revealer: ListRevealer,
    extractor: Extractor,
    timings: Timings,
    events: Arc<dyn EventSink>,
}

impl ExtractionSession {
    pub fn new(
        locators: &'static Locators,
        timings: Timings,
        limits: RevealLimits,
        events: Arc<dyn EventSink>,
    ) -> Self {
        ExtractionSession {
            state: Mutex::new(SessionState {
                phase: Phase::Idle,
                records: Vec::new(),
                cursor: 0,
                status: STATUS_READY.to_string(),
                error: None,
                epoch: 0,
            }),
            locators,
            revealer: ListRevealer::new(locators, limits, timings.scroll_settle),
            extractor: Extractor::new(locators, timings.detail_settle),
            timings,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // The state stays consistent across a panicking holder: every
        // mutation is a handful of field writes.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claims the session for a new run, clearing any previous results.
    pub fn begin(&self) -> Result<RunTicket, SessionError> {
        let mut state = self.lock();
        if state.phase.is_active() {
            return Err(SessionError::AlreadyRunning);
        }
        state.reset();
        state.epoch += 1;
        state.phase = Phase::Running;
        state.status = STATUS_SCROLLING.to_string();
        let ticket = RunTicket { epoch: state.epoch };
        drop(state);

        self.emit_status(STATUS_SCROLLING, true, false);
        Ok(ticket)
    }

    /// Runs a claimed session to completion on the calling thread.
    pub fn run(&self, ticket: RunTicket, page: &dyn MapsPage) -> Result<usize, SessionError> {
        match self.reveal_and_extract(&ticket, page) {
            Ok(()) => self.complete(&ticket),
            Err(SessionError::Discarded) => {
                info!("Run abandoned after cleanup");
                Err(SessionError::Discarded)
            }
            Err(e) => self.fail(&ticket, e),
        }
    }

    pub fn start(&self, page: &dyn MapsPage) -> Result<usize, SessionError> {
        let ticket = self.begin()?;
        self.run(ticket, page)
    }

    fn reveal_and_extract(&self, ticket: &RunTicket, page: &dyn MapsPage) -> Result<(), SessionError> {
        let gate = RunGate {
            session: self,
            epoch: ticket.epoch,
        };
        let revealed = self.revealer.reveal_all(page, &gate)?;
        if revealed.exit == RevealExit::Ceiling {
            warn!("Stopped at {} scrolls, the list may be incomplete", revealed.scrolls);
        }

        let items = self.locators.items;
        let total = page.item_count(items)?;
        info!("Found {} listings to scrape", total);
        gate.status(&format!("Scraping {} listings...", total));

        for index in 0..total {
            gate.checkpoint()?;
            match self.extractor.extract(&ItemHandle::new(page, items, index)) {
                Extraction::Usable(record) => self.append(ticket, record)?,
                Extraction::Unusable => {}
            }
            delay_manager::settle(self.timings.item_delay, "between listings");
        }
        Ok(())
    }

    fn append(&self, ticket: &RunTicket, record: Record) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            return Err(SessionError::Discarded);
        }
        state.records.push(record);
        state.cursor = state.records.len();
        let event = ScrapeEvent::UpdateCounter {
            count: state.records.len(),
            data: state.records.clone(),
        };
        drop(state);

        self.events.emit(event);
        Ok(())
    }

    fn complete(&self, ticket: &RunTicket) -> Result<usize, SessionError> {
        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            return Err(SessionError::Discarded);
        }
        state.phase = Phase::Complete;
        state.status = STATUS_COMPLETED.to_string();
        let count = state.records.len();
        let data = state.records.clone();
        drop(state);

        info!("Scraping completed with {} records", count);
        self.emit_status(STATUS_COMPLETED, false, false);
        self.events.emit(ScrapeEvent::ScrapingComplete { count, data });
        Ok(count)
    }

    fn fail(&self, ticket: &RunTicket, e: SessionError) -> Result<usize, SessionError> {
        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            return Err(SessionError::Discarded);
        }
        let status = format!("Error: {}", e);
        state.phase = Phase::Error;
        state.status = status.clone();
        state.error = Some(e.to_string());
        drop(state);

        error!("Scraping error: {}", e);
        self.emit_status(&status, false, false);
        Err(e)
    }

    /// Flips `Running` and `Paused`. Returns whether the session is now paused.
    pub fn toggle_pause(&self) -> bool {
        let mut state = self.lock();
        let next = match state.phase {
            Phase::Running => Phase::Paused,
            Phase::Paused => Phase::Running,
            other => {
                warn!("Pause toggled while {:?}; ignoring", other);
                return false;
            }
        };
        state.phase = next;
        let paused = next == Phase::Paused;
        let status = if paused { STATUS_PAUSED } else { STATUS_IN_PROGRESS };
        state.status = status.to_string();
        drop(state);

        info!("Session {}", if paused { "paused" } else { "resumed" });
        self.emit_status(status, true, paused);
        paused
    }

    pub fn get_state(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            phase: state.phase,
            count: state.records.len(),
            data: state.records.clone(),
            is_active: state.phase.is_active(),
            is_paused: state.phase == Phase::Paused,
            status: state.status.clone(),
            error: state.error.clone(),
        }
    }

    pub fn get_data(&self) -> Vec<Record> {
        self.lock().records.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Number of records appended by the current or last run.
    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    /// Forces the session back to `Idle` with no records, whatever it was doing.
    pub fn cleanup(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.reset();
        drop(state);
        info!("Scraper memory cleaned up");
    }

    fn emit_status(&self, status: &str, is_active: bool, is_paused: bool) {
        self.events.emit(ScrapeEvent::UpdateStatus {
            status: status.to_string(),
            is_active,
            is_paused,
        });
    }
}

struct RunGate<'a> {
    session: &'a ExtractionSession,
    epoch: u64,
}

impl Checkpoint for RunGate<'_> {
    fn checkpoint(&self) -> Result<(), SessionError> {
        loop {
            {
                let state = self.session.lock();
                if state.epoch != self.epoch {
                    return Err(SessionError::Discarded);
                }
                if state.phase != Phase::Paused {
                    return Ok(());
                }
            }
            delay_manager::poll_interval(self.session.timings.pause_poll);
        }
    }

    fn status(&self, status: &str) {
        let mut state = self.session.lock();
        if state.epoch != self.epoch || state.phase != Phase::Running {
            return;
        }
        state.status = status.to_string();
        drop(state);
        self.session.emit_status(status, true, false);
    }
}
