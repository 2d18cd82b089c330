use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::batch::{BatchError, BatchOrchestrator, BatchProgress};
use crate::config::ScraperConfig;
use crate::events::{RecentEvents, ScrapeEvent};
use crate::exporter::{Columns, CsvExporter, Exporter};
use crate::locators::Locators;
use crate::page::{MapsPage, PageProvisioner};
use crate::protocol::{DataReply, ExportReply, Outcome, PauseReply, Reply, Request};
use crate::search;
use crate::session::ExtractionSession;

/// Events kept for pollers, same depth as a job log.
pub const RECENT_EVENTS: usize = 50;

/// The hosting context: one interactive page with its session, plus the batch
/// orchestrator that opens pages of its own.
pub struct ContextHost {
    page: Arc<dyn MapsPage>,
    session: Arc<ExtractionSession>,
    batch: Arc<BatchOrchestrator>,
    events: Arc<RecentEvents>,
    locators: &'static Locators,
    keystroke: Duration,
    out_dir: PathBuf,
    columns: Columns,
}

impl ContextHost {
    pub fn new(
        page: Arc<dyn MapsPage>,
        provisioner: Arc<dyn PageProvisioner>,
        config: &ScraperConfig,
    ) -> Self {
        let locators = &Locators::GOOGLE_MAPS;
        let events = Arc::new(RecentEvents::new(RECENT_EVENTS));
        let session = Arc::new(ExtractionSession::new(
            locators,
            config.timings,
            config.limits,
            events.clone(),
        ));
        let exporter: Arc<dyn Exporter> = Arc::new(CsvExporter::new(&config.output_dir, config.columns));
        let batch = Arc::new(BatchOrchestrator::new(
            provisioner,
            exporter,
            events.clone(),
            locators,
            config.batch.clone(),
            config.timings,
            config.limits,
        ));
        ContextHost {
            page,
            session,
            batch,
            events,
            locators,
            keystroke: config.timings.keystroke,
            out_dir: config.output_dir.clone(),
            columns: config.columns,
        }
    }

    pub fn session(&self) -> &Arc<ExtractionSession> {
        &self.session
    }

    pub fn recent_events(&self) -> Vec<ScrapeEvent> {
        self.events.snapshot()
    }

    pub fn batch_progress(&self) -> BatchProgress {
        self.batch.progress()
    }

    /// Answers one protocol message. Long-running work is moved to worker
    /// threads, so every call returns promptly except `search`.
    pub fn handle(&self, request: Request) -> Reply {
        match request {
            Request::StartScraping => Reply::Outcome(self.start_scraping()),
            Request::TogglePause => Reply::Paused(PauseReply {
                is_paused: self.session.toggle_pause(),
            }),
            Request::GetData => Reply::Data(DataReply {
                data: self.session.get_data(),
            }),
            Request::GetState => Reply::State(self.session.get_state()),
            Request::Cleanup => {
                self.session.cleanup();
                Reply::Outcome(Outcome::ok())
            }
            Request::StartBatchScrape { business_types } => Reply::Outcome(self.start_batch(business_types)),
            Request::Search { query } => Reply::Outcome(
                match search::submit_search(self.page.as_ref(), self.locators, &query, self.keystroke) {
                    Ok(()) => Outcome::ok(),
                    Err(e) => {
                        warn!("Search for '{}' failed: {}", query, e);
                        Outcome::failed(e)
                    }
                },
            ),
            Request::Export { columns } => Reply::Exported(self.export(columns.unwrap_or(self.columns))),
        }
    }

    fn start_scraping(&self) -> Outcome {
        let ticket = match self.session.begin() {
            Ok(ticket) => ticket,
            Err(e) => return Outcome::failed(e),
        };
        let session = Arc::clone(&self.session);
        let page = Arc::clone(&self.page);
        let spawned = thread::Builder::new()
            .name("session".to_string())
            .spawn(move || {
                if let Err(e) = session.run(ticket, page.as_ref()) {
                    warn!("Session run ended: {}", e);
                }
            });
        match spawned {
            Ok(_) => Outcome::ok(),
            Err(e) => {
                error!("Could not spawn session worker: {}", e);
                self.session.cleanup();
                Outcome::failed(e)
            }
        }
    }

    fn start_batch(&self, terms: Vec<String>) -> Outcome {
        let total = terms.len();
        match self.batch.spawn(terms) {
            Ok(_) => {
                info!("Batch of {} terms accepted", total);
                Outcome::ok()
            }
            Err(BatchError::AlreadyRunning) => Outcome::failed(BatchError::AlreadyRunning),
            Err(e) => {
                error!("Batch did not start: {}", e);
                Outcome::failed(e)
            }
        }
    }

    fn export(&self, columns: Columns) -> ExportReply {
        let records = self.session.get_data();
        match CsvExporter::new(&self.out_dir, columns).export(None, &records) {
            Ok(path) => ExportReply {
                success: true,
                path: Some(path.display().to_string()),
                error: None,
            },
            Err(e) => ExportReply {
                success: false,
                path: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timings;
    use crate::page::fake::{card, detail, FakePage, FakeProvisioner};
    use crate::session::Phase;
    use std::time::Instant;

    fn config(out_dir: PathBuf) -> ScraperConfig {
        ScraperConfig {
            timings: Timings::immediate(),
            output_dir: out_dir,
            ..ScraperConfig::default()
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("maps_scraper_host_{}", uuid::Uuid::new_v4()))
    }

    fn page() -> Arc<FakePage> {
        Arc::new(
            FakePage::new(vec![card("Petal Co", "4.9", "31"), card("Stem & Leaf", "4.2", "9")]).with_details(vec![
                detail("Florist", "5 Bloom Ave", "(555) 200-0001", "https://petal.example/"),
                detail("Florist", "6 Bloom Ave", "(555) 200-0002", "https://stem.example/"),
            ]),
        )
    }

    fn host_with(page: Arc<FakePage>, provisioner: FakeProvisioner, out_dir: PathBuf) -> ContextHost {
        ContextHost::new(page, Arc::new(provisioner), &config(out_dir))
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn start_scraping_runs_to_completion() {
        let host = host_with(page(), FakeProvisioner::new(Vec::new()), temp_dir());

        assert_eq!(host.handle(Request::StartScraping), Reply::Outcome(Outcome::ok()));
        wait_until(|| host.session().phase() == Phase::Complete);

        match host.handle(Request::GetData) {
            Reply::Data(DataReply { data }) => {
                assert_eq!(data.len(), 2);
                assert_eq!(data[1].name, "Stem & Leaf");
            }
            other => panic!("unexpected reply {:?}", other),
        }
        match host.handle(Request::GetState) {
            Reply::State(state) => {
                assert_eq!(state.count, 2);
                assert!(!state.is_active);
                assert_eq!(state.status, "Scraping completed!");
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(host
            .recent_events()
            .iter()
            .any(|e| matches!(e, ScrapeEvent::ScrapingComplete { count: 2, .. })));
    }

    #[test]
    fn second_start_while_running_is_refused() {
        let host = host_with(page(), FakeProvisioner::new(Vec::new()), temp_dir());
        let _ticket = host.session().begin().unwrap();

        let reply = serde_json::to_value(host.handle(Request::StartScraping)).unwrap();
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"], "Scraping already in progress");
    }

    #[test]
    fn toggle_and_cleanup_replies() {
        let host = host_with(page(), FakeProvisioner::new(Vec::new()), temp_dir());
        assert_eq!(
            host.handle(Request::TogglePause),
            Reply::Paused(PauseReply { is_paused: false })
        );

        let _ticket = host.session().begin().unwrap();
        assert_eq!(host.handle(Request::TogglePause), Reply::Paused(PauseReply { is_paused: true }));
        assert_eq!(host.handle(Request::Cleanup), Reply::Outcome(Outcome::ok()));
        assert_eq!(host.session().phase(), Phase::Idle);
    }

    #[test]
    fn search_types_into_the_hosted_page() {
        let page = page();
        let host = host_with(page.clone(), FakeProvisioner::new(Vec::new()), temp_dir());
        assert_eq!(
            host.handle(Request::Search {
                query: "florist".into()
            }),
            Reply::Outcome(Outcome::ok())
        );
        assert_eq!(page.state.lock().unwrap().typed, "florist");
    }

    #[test]
    fn export_writes_session_records() {
        let dir = temp_dir();
        let host = host_with(page(), FakeProvisioner::new(Vec::new()), dir.clone());

        match host.handle(Request::Export { columns: None }) {
            Reply::Exported(reply) => assert!(!reply.success),
            other => panic!("unexpected reply {:?}", other),
        }

        host.session().start(page().as_ref()).unwrap();
        match host.handle(Request::Export {
            columns: Some(Columns::Compact),
        }) {
            Reply::Exported(ExportReply {
                success: true,
                path: Some(path),
                ..
            }) => {
                let content = std::fs::read_to_string(&path).unwrap();
                assert!(content.starts_with("Business Name,Category,"));
                assert!(path.contains("export_"));
            }
            other => panic!("unexpected reply {:?}", other),
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn batch_runs_in_the_background() {
        let dir = temp_dir();
        let provisioner = FakeProvisioner::new(vec![Some(page())]);
        let host = host_with(page(), provisioner, dir.clone());

        let reply = host.handle(Request::StartBatchScrape {
            business_types: vec!["florist".into()],
        });
        assert_eq!(reply, Reply::Outcome(Outcome::ok()));

        wait_until(|| host.recent_events().last() == Some(&ScrapeEvent::BatchComplete));
        let progress = host.batch_progress();
        assert_eq!(progress.total, 1);
        assert_eq!(progress.current_term, "florist");

        let files: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
