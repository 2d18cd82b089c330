use std::collections::VecDeque;
use std::sync::Mutex;

use log::{debug, info};
use serde::Serialize;

use crate::record::Record;

/// Fire-and-forget notifications emitted by sessions and batches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ScrapeEvent {
    #[serde(rename_all = "camelCase")]
    UpdateCounter { count: usize, data: Vec<Record> },
    #[serde(rename_all = "camelCase")]
    UpdateStatus {
        status: String,
        is_active: bool,
        is_paused: bool,
    },
    #[serde(rename_all = "camelCase")]
    ScrapingComplete { count: usize, data: Vec<Record> },
    #[serde(rename_all = "camelCase")]
    BatchProgress {
        current: usize,
        total: usize,
        business_type: String,
    },
    BatchComplete,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ScrapeEvent);
}

/// Writes every event to the log.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: ScrapeEvent) {
        match event {
            ScrapeEvent::UpdateCounter { count, .. } => debug!("Records so far: {}", count),
            ScrapeEvent::UpdateStatus { status, .. } => info!("{}", status),
            ScrapeEvent::ScrapingComplete { count, .. } => info!("Scraping complete: {} records", count),
            ScrapeEvent::BatchProgress {
                current,
                total,
                business_type,
            } => info!("Batch {} / {} : {}", current, total, business_type),
            ScrapeEvent::BatchComplete => info!("Batch complete"),
        }
    }
}

/// Keeps the most recent events for pollers, dropping the oldest.
pub struct RecentEvents {
    capacity: usize,
    events: Mutex<VecDeque<ScrapeEvent>>,
}

impl RecentEvents {
    pub fn new(capacity: usize) -> Self {
        RecentEvents {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn snapshot(&self) -> Vec<ScrapeEvent> {
        match self.events.lock() {
            Ok(events) => events.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }
}

impl EventSink for RecentEvents {
    fn emit(&self, event: ScrapeEvent) {
        LogSink.emit(event.clone());
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}
