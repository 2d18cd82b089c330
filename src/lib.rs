pub mod batch;
pub mod browser;
pub mod config;
pub mod delay_manager;
pub mod events;
pub mod exporter;
pub mod extractor;
pub mod flight;
pub mod host;
pub mod input_loader;
pub mod locators;
pub mod logger;
pub mod page;
pub mod protocol;
pub mod record;
pub mod resume_manager;
pub mod revealer;
pub mod search;
pub mod session;

// Exporting types for convenience
pub use batch::{BatchOrchestrator, BatchSummary, TermOutcome};
pub use browser::ChromeProvisioner;
pub use config::ScraperConfig;
pub use exporter::{Columns, CsvExporter, Exporter};
pub use host::ContextHost;
pub use record::Record;
pub use resume_manager::ProgressState;
pub use session::ExtractionSession;
