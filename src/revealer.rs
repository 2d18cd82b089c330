use std::time::Duration;

use log::{debug, info};

use crate::config::RevealLimits;
use crate::delay_manager;
use crate::locators::Locators;
use crate::page::MapsPage;
use crate::session::SessionError;

/// Consulted before every unit of work. Blocks while the run is paused and
/// fails once the run has been discarded.
pub trait Checkpoint {
    fn checkpoint(&self) -> Result<(), SessionError>;

    /// Free-form progress line.
    fn status(&self, _status: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealExit {
    EndMarker,
    Stalled,
    Ceiling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealOutcome {
    pub exit: RevealExit,
    pub scrolls: usize,
}

pub struct ListRevealer {
    locators: &'static Locators,
    limits: RevealLimits,
    settle: Duration,
}

impl ListRevealer {
    pub fn new(locators: &'static Locators, limits: RevealLimits, settle: Duration) -> Self {
        ListRevealer {
            locators,
            limits,
            settle,
        }
    }

    /// Scrolls the results feed until the end marker shows, the feed stops
    /// growing, or the scroll ceiling is hit.
    pub fn reveal_all(&self, page: &dyn MapsPage, gate: &dyn Checkpoint) -> Result<RevealOutcome, SessionError> {
        let loc = self.locators;
        let feed = match page.locate_feed(loc.feed)? {
            Some(i) => loc.feed[i],
            None => return Err(SessionError::ContainerNotFound),
        };
        debug!("Found feed container using selector: {}", feed);

        let mut last_extent = page.feed_extent(feed)?;
        let mut no_growth = 0;
        let mut scrolls = 0;

        let exit = loop {
            if scrolls >= self.limits.max_scrolls {
                break RevealExit::Ceiling;
            }
            if no_growth >= self.limits.max_no_growth {
                break RevealExit::Stalled;
            }
            gate.checkpoint()?;

            if page.feed_has_text(feed, loc.end_marker.selector, loc.end_marker.text)? {
                info!("Reached end of list message detected");
                break RevealExit::EndMarker;
            }

            page.scroll_feed(feed)?;
            delay_manager::settle(self.settle, "feed growth");
            let extent = page.feed_extent(feed)?;
            scrolls += 1;

            if extent == last_extent {
                no_growth += 1;
                debug!("No new content ({}/{})", no_growth, self.limits.max_no_growth);
            } else {
                no_growth = 0;
                debug!("Scroll {}: loaded more results", scrolls);
                last_extent = extent;
            }

            let found = page.item_count(loc.items)?;
            gate.status(&format!("Loading results... ({} found)", found));
        };

        info!("Scrolling complete after {} scrolls ({:?})", scrolls, exit);
        Ok(RevealOutcome { exit, scrolls })
    }
}
