use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exporter::Columns;

// Settle and poll delays against the live page. They are timing assumptions
// about an application we do not control, so they stay tunable.
pub const SCROLL_SETTLE_MS: u64 = 3_000;
pub const DETAIL_SETTLE_MS: u64 = 1_500;
pub const ITEM_DELAY_MS: u64 = 100;
pub const PAUSE_POLL_MS: u64 = 100;
pub const PAGE_INIT_SETTLE_MS: u64 = 3_000;
pub const CONSENT_SETTLE_MS: u64 = 2_000;
pub const HOST_SETTLE_MS: u64 = 500;
pub const KEYSTROKE_MS: u64 = 50;
pub const RESULTS_TIMEOUT_MS: u64 = 15_000;
pub const RESULTS_POLL_MS: u64 = 500;
pub const FIXED_RESULTS_DELAY_MS: u64 = 5_000;
pub const STATE_POLL_MS: u64 = 1_000;
pub const TERM_CEILING_MS: u64 = 5 * 60 * 1_000;
pub const INTER_TERM_MS: u64 = 2_000;

pub const MAX_SCROLLS: usize = 100;
pub const MAX_NO_GROWTH: usize = 5;

pub const BASE_URL: &str = "https://www.google.com/maps";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Every delay used while driving a page. Serialized as milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Timings {
    #[serde(with = "millis")]
    pub scroll_settle: Duration,
    #[serde(with = "millis")]
    pub detail_settle: Duration,
    #[serde(with = "millis")]
    pub item_delay: Duration,
    #[serde(with = "millis")]
    pub pause_poll: Duration,
    #[serde(with = "millis")]
    pub page_init_settle: Duration,
    #[serde(with = "millis")]
    pub consent_settle: Duration,
    #[serde(with = "millis")]
    pub host_settle: Duration,
    #[serde(with = "millis")]
    pub keystroke: Duration,
    #[serde(with = "millis")]
    pub results_timeout: Duration,
    #[serde(with = "millis")]
    pub results_poll: Duration,
    #[serde(with = "millis")]
    pub fixed_results_delay: Duration,
    #[serde(with = "millis")]
    pub state_poll: Duration,
    #[serde(with = "millis")]
    pub term_ceiling: Duration,
    #[serde(with = "millis")]
    pub inter_term: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            scroll_settle: Duration::from_millis(SCROLL_SETTLE_MS),
            detail_settle: Duration::from_millis(DETAIL_SETTLE_MS),
            item_delay: Duration::from_millis(ITEM_DELAY_MS),
            pause_poll: Duration::from_millis(PAUSE_POLL_MS),
            page_init_settle: Duration::from_millis(PAGE_INIT_SETTLE_MS),
            consent_settle: Duration::from_millis(CONSENT_SETTLE_MS),
            host_settle: Duration::from_millis(HOST_SETTLE_MS),
            keystroke: Duration::from_millis(KEYSTROKE_MS),
            results_timeout: Duration::from_millis(RESULTS_TIMEOUT_MS),
            results_poll: Duration::from_millis(RESULTS_POLL_MS),
            fixed_results_delay: Duration::from_millis(FIXED_RESULTS_DELAY_MS),
            state_poll: Duration::from_millis(STATE_POLL_MS),
            term_ceiling: Duration::from_millis(TERM_CEILING_MS),
            inter_term: Duration::from_millis(INTER_TERM_MS),
        }
    }
}

impl Timings {
    /// No waiting anywhere, except a 1ms poll so wait loops still yield.
    pub fn immediate() -> Self {
        let poll = Duration::from_millis(1);
        Timings {
            scroll_settle: Duration::ZERO,
            detail_settle: Duration::ZERO,
            item_delay: Duration::ZERO,
            pause_poll: poll,
            page_init_settle: Duration::ZERO,
            consent_settle: Duration::ZERO,
            host_settle: Duration::ZERO,
            keystroke: Duration::ZERO,
            results_timeout: Duration::ZERO,
            results_poll: poll,
            fixed_results_delay: Duration::ZERO,
            state_poll: poll,
            term_ceiling: Duration::from_secs(10),
            inter_term: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RevealLimits {
    pub max_scrolls: usize,
    pub max_no_growth: usize,
}

impl Default for RevealLimits {
    fn default() -> Self {
        RevealLimits {
            max_scrolls: MAX_SCROLLS,
            max_no_growth: MAX_NO_GROWTH,
        }
    }
}

/// Whether batch tabs are brought to the foreground when opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabMode {
    #[default]
    Background,
    Foreground,
}

/// How the batch waits for results after submitting a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultsWait {
    #[default]
    Polled,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BatchOptions {
    pub base_url: String,
    pub tab: TabMode,
    pub results_wait: ResultsWait,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            base_url: BASE_URL.to_string(),
            tab: TabMode::default(),
            results_wait: ResultsWait::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        BrowserOptions {
            headless: true,
            window_width: 1280,
            window_height: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScraperConfig {
    pub timings: Timings,
    pub limits: RevealLimits,
    pub batch: BatchOptions,
    pub columns: Columns,
    pub output_dir: PathBuf,
    pub browser: BrowserOptions,
    pub bind: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        ScraperConfig {
            timings: Timings::default(),
            limits: RevealLimits::default(),
            batch: BatchOptions::default(),
            columns: Columns::default(),
            output_dir: PathBuf::from("outputs"),
            browser: BrowserOptions::default(),
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ScraperConfig {
    /// Reads a JSON config file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
