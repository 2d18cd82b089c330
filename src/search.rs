use std::time::{Duration, Instant};

use log::{info, warn};
use thiserror::Error;

use crate::config::{ResultsWait, Timings};
use crate::delay_manager;
use crate::locators::Locators;
use crate::page::{MapsPage, PageError};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search box not found")]
    SearchBoxMissing,
    #[error("search term is empty")]
    EmptyTerm,
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Dismisses the consent interstitial if one is shown, then lets the page
/// settle. Best-effort: a missing button or a page error is only logged.
pub fn accept_consent(page: &dyn MapsPage, locators: &Locators, settle: Duration) -> bool {
    info!("Accepting consent form..");
    let accepted = match page.accept_consent(locators.consent_button) {
        Ok(true) => true,
        Ok(false) => {
            warn!("Consent form button not found.");
            false
        }
        Err(e) => {
            warn!("Could not accept consent form: {}", e);
            false
        }
    };
    delay_manager::settle(settle, "consent form");
    accepted
}

/// Types the term one character at a time and submits it. The application
/// listens for input events, so setting the field value is not enough.
pub fn submit_search(
    page: &dyn MapsPage,
    locators: &Locators,
    term: &str,
    keystroke: Duration,
) -> Result<(), SearchError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(SearchError::EmptyTerm);
    }
    if !page.focus_search(locators.search_input)? {
        return Err(SearchError::SearchBoxMissing);
    }

    info!("Searching for: '{}'", term);
    for ch in term.chars() {
        page.type_char(ch)?;
        delay_manager::poll_interval(keystroke);
    }
    page.submit_search(locators.search_submit)?;
    Ok(())
}

/// Waits for the first result item. `Ok(false)` means the wait gave up; the
/// caller carries on regardless.
pub fn await_results(
    page: &dyn MapsPage,
    locators: &Locators,
    wait: ResultsWait,
    timings: &Timings,
) -> Result<bool, PageError> {
    match wait {
        ResultsWait::Fixed => {
            delay_manager::settle(timings.fixed_results_delay, "search results");
            Ok(page.item_count(locators.items)? > 0)
        }
        ResultsWait::Polled => {
            let deadline = Instant::now() + timings.results_timeout;
            loop {
                if page.item_count(locators.items)? > 0 {
                    return Ok(true);
                }
                if Instant::now() >= deadline {
                    warn!(
                        "No results after {} ms, continuing anyway",
                        timings.results_timeout.as_millis()
                    );
                    return Ok(false);
                }
                delay_manager::poll_interval(timings.results_poll);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::{card, FakePage};

    #[test]
    fn types_every_character_then_submits() {
        let page = FakePage::new(Vec::new());
        submit_search(&page, &Locators::GOOGLE_MAPS, "  pizza near me ", Duration::ZERO).unwrap();

        let state = page.state.lock().unwrap();
        assert_eq!(state.typed, "pizza near me");
        assert!(state.submitted);
    }

    #[test]
    fn missing_search_box_is_reported() {
        let mut page = FakePage::new(Vec::new());
        page.has_search = false;
        let err = submit_search(&page, &Locators::GOOGLE_MAPS, "bakery", Duration::ZERO).unwrap_err();
        assert!(matches!(err, SearchError::SearchBoxMissing));
        assert!(!page.state.lock().unwrap().submitted);
    }

    #[test]
    fn blank_term_is_rejected_before_typing() {
        let page = FakePage::new(Vec::new());
        let err = submit_search(&page, &Locators::GOOGLE_MAPS, "   ", Duration::ZERO).unwrap_err();
        assert!(matches!(err, SearchError::EmptyTerm));
        assert!(page.state.lock().unwrap().typed.is_empty());
    }

    #[test]
    fn consent_wall_is_cleared_before_searching() {
        let mut page = FakePage::new(Vec::new());
        page.consent_wall = true;
        assert!(matches!(
            submit_search(&page, &Locators::GOOGLE_MAPS, "bakery", Duration::ZERO),
            Err(SearchError::SearchBoxMissing)
        ));

        assert!(accept_consent(&page, &Locators::GOOGLE_MAPS, Duration::ZERO));
        submit_search(&page, &Locators::GOOGLE_MAPS, "bakery", Duration::ZERO).unwrap();
        assert_eq!(page.state.lock().unwrap().typed, "bakery");
    }

    #[test]
    fn missing_consent_button_is_not_an_error() {
        let page = FakePage::new(Vec::new());
        assert!(!accept_consent(&page, &Locators::GOOGLE_MAPS, Duration::ZERO));
        assert!(!page.state.lock().unwrap().consent_accepted);
    }

    #[test]
    fn fixed_wait_sleeps_then_checks_once() {
        let mut timings = Timings::immediate();
        timings.fixed_results_delay = Duration::from_millis(20);

        let started = Instant::now();
        let page = FakePage::new(vec![card("A", "1", "1")]);
        assert!(await_results(&page, &Locators::GOOGLE_MAPS, ResultsWait::Fixed, &timings).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(20));

        let empty = FakePage::new(Vec::new());
        assert!(!await_results(&empty, &Locators::GOOGLE_MAPS, ResultsWait::Fixed, &timings).unwrap());
    }

    #[test]
    fn polled_wait_sees_results() {
        let page = FakePage::new(vec![card("A", "1", "1")]);
        let found = await_results(&page, &Locators::GOOGLE_MAPS, ResultsWait::Polled, &Timings::immediate()).unwrap();
        assert!(found);
    }

    #[test]
    fn polled_wait_gives_up_at_the_deadline() {
        let page = FakePage::new(Vec::new());
        let mut timings = Timings::immediate();
        timings.results_timeout = Duration::from_millis(20);

        let started = Instant::now();
        let found = await_results(&page, &Locators::GOOGLE_MAPS, ResultsWait::Polled, &timings).unwrap();
        assert!(!found);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
