use std::sync::Arc;

use thiserror::Error;

use crate::config::TabMode;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("browser error: {0}")]
    Browser(String),
    #[error("unexpected script result: {0}")]
    Script(String),
    #[error("page context is closed")]
    Closed,
}

impl From<anyhow::Error> for PageError {
    fn from(e: anyhow::Error) -> Self {
        PageError::Browser(format!("{:#}", e))
    }
}

/// One live page context showing the mapping application.
///
/// Every lookup takes its prioritized selector strategies explicitly; the
/// implementation uses the first strategy that matches anything.
pub trait MapsPage: Send + Sync {
    /// Blocks until the document reports that navigation finished.
    fn wait_until_loaded(&self) -> Result<(), PageError>;

    /// Index of the first feed strategy that matches a container.
    fn locate_feed(&self, strategies: &[&str]) -> Result<Option<usize>, PageError>;
    fn scroll_feed(&self, feed: &str) -> Result<(), PageError>;
    /// Current scrollable extent of the feed container.
    fn feed_extent(&self, feed: &str) -> Result<u64, PageError>;
    fn feed_has_text(&self, feed: &str, marker: &str, needle: &str) -> Result<bool, PageError>;

    fn item_count(&self, strategies: &[&str]) -> Result<usize, PageError>;
    /// Markup of one result item as currently rendered.
    fn item_html(&self, strategies: &[&str], index: usize) -> Result<String, PageError>;
    /// Triggers the first `targets` match inside the item. `false` when the
    /// item has no such affordance.
    fn activate_item(&self, strategies: &[&str], index: usize, targets: &[&str]) -> Result<bool, PageError>;
    /// Markup of the shared detail panel, empty when none is shown.
    fn detail_html(&self, strategies: &[&str]) -> Result<String, PageError>;

    /// Clicks the first consent button found. `false` when no dialog is shown.
    fn accept_consent(&self, strategies: &[&str]) -> Result<bool, PageError>;

    /// Focuses and clears the search input. `false` when no input exists.
    fn focus_search(&self, strategies: &[&str]) -> Result<bool, PageError>;
    fn type_char(&self, ch: char) -> Result<(), PageError>;
    fn submit_search(&self, strategies: &[&str]) -> Result<(), PageError>;

    fn close(&self) -> Result<(), PageError>;
}

/// Creates fresh page contexts for batch terms.
pub trait PageProvisioner: Send + Sync {
    fn provision(&self, url: &str, mode: TabMode) -> Result<Arc<dyn MapsPage>, PageError>;
}

/// Opaque handle to one revealed result item.
#[derive(Clone, Copy)]
pub struct ItemHandle<'a> {
    page: &'a dyn MapsPage,
    strategies: &'a [&'a str],
    index: usize,
}

impl<'a> ItemHandle<'a> {
    pub fn new(page: &'a dyn MapsPage, strategies: &'a [&'a str], index: usize) -> Self {
        ItemHandle {
            page,
            strategies,
            index,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn html(&self) -> Result<String, PageError> {
        self.page.item_html(self.strategies, self.index)
    }

    pub fn activate(&self, targets: &[&str]) -> Result<bool, PageError> {
        self.page.activate_item(self.strategies, self.index, targets)
    }

    pub fn detail_html(&self, panel: &[&str]) -> Result<String, PageError> {
        self.page.detail_html(panel)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scriptable in-memory page used across the crate's tests.

    use super::*;
    use std::sync::Mutex;

    pub fn card(name: &str, rating: &str, reviews: &str) -> String {
        format!(
            r#"<div role="article" class="Nv2PK"><a class="hfpxzc" aria-label="{name}" href="https://www.google.com/maps/place/x"></a><div class="qBF1Pd fontHeadlineSmall">{name}</div><span class="ZkP5Je" role="img" aria-label="{rating} stars {reviews} Reviews"><span class="MW4etd">{rating}</span><span class="UY7F9">({reviews})</span></span></div>"#
        )
    }

    pub fn nameless_card() -> String {
        r#"<div role="article" class="Nv2PK"><span class="MW4etd">4.0</span></div>"#.to_string()
    }

    pub fn detail(category: &str, address: &str, phone: &str, website: &str) -> String {
        format!(
            r#"<div role="main" aria-label="Detail"><button class="DkEaL">{category}</button><button data-item-id="address" aria-label="Address: {address}"><div class="Io6YTe">{address}</div></button><button data-item-id="phone:tel:1" aria-label="Phone: {phone}"><div class="Io6YTe">{phone}</div></button><a data-item-id="authority" href="{website}"></a><div class="t39EBf" aria-label="Open 7 AM to 6 PM"></div></div>"#
        )
    }

    #[derive(Default)]
    pub struct FakeState {
        pub scrolls: usize,
        pub active: Option<usize>,
        pub html_reads: Vec<usize>,
        pub typed: String,
        pub submitted: bool,
        pub consent_accepted: bool,
        pub closed: bool,
    }

    type Hook = Box<dyn Fn(usize) + Send + Sync>;

    pub struct FakePage {
        pub cards: Vec<String>,
        pub details: Vec<String>,
        pub has_feed: bool,
        pub has_search: bool,
        pub activatable: bool,
        /// Items without a details link.
        pub no_link: Vec<usize>,
        /// Whether a consent dialog covers the page.
        pub consent_wall: bool,
        pub base_extent: u64,
        pub growth: u64,
        /// Scrolls after which the feed stops growing.
        pub grow_until: usize,
        /// Scroll count after which the end marker shows.
        pub end_after: Option<usize>,
        pub fail_items: Vec<usize>,
        pub on_item: Option<Hook>,
        /// Called with the scroll count after every scroll.
        pub on_scroll: Option<Hook>,
        pub state: Mutex<FakeState>,
    }

    impl FakePage {
        pub fn new(cards: Vec<String>) -> Self {
            FakePage {
                cards,
                details: Vec::new(),
                has_feed: true,
                has_search: true,
                activatable: true,
                no_link: Vec::new(),
                consent_wall: false,
                base_extent: 1_000,
                growth: 0,
                grow_until: 0,
                end_after: None,
                fail_items: Vec::new(),
                on_item: None,
                on_scroll: None,
                state: Mutex::new(FakeState::default()),
            }
        }

        pub fn with_details(mut self, details: Vec<String>) -> Self {
            self.details = details;
            self
        }

        pub fn scrolls(&self) -> usize {
            self.state.lock().unwrap().scrolls
        }

        pub fn html_reads(&self) -> Vec<usize> {
            self.state.lock().unwrap().html_reads.clone()
        }
    }

    impl MapsPage for FakePage {
        fn wait_until_loaded(&self) -> Result<(), PageError> {
            Ok(())
        }

        fn locate_feed(&self, _strategies: &[&str]) -> Result<Option<usize>, PageError> {
            Ok(if self.has_feed { Some(0) } else { None })
        }

        fn scroll_feed(&self, _feed: &str) -> Result<(), PageError> {
            let scrolls = {
                let mut state = self.state.lock().unwrap();
                state.scrolls += 1;
                state.scrolls
            };
            if let Some(hook) = &self.on_scroll {
                hook(scrolls);
            }
            Ok(())
        }

        fn feed_extent(&self, _feed: &str) -> Result<u64, PageError> {
            let scrolls = self.state.lock().unwrap().scrolls;
            Ok(self.base_extent + self.growth * scrolls.min(self.grow_until) as u64)
        }

        fn feed_has_text(&self, _feed: &str, _marker: &str, _needle: &str) -> Result<bool, PageError> {
            let scrolls = self.state.lock().unwrap().scrolls;
            Ok(self.end_after.map_or(false, |n| scrolls >= n))
        }

        fn item_count(&self, _strategies: &[&str]) -> Result<usize, PageError> {
            Ok(self.cards.len())
        }

        fn item_html(&self, _strategies: &[&str], index: usize) -> Result<String, PageError> {
            self.state.lock().unwrap().html_reads.push(index);
            if let Some(hook) = &self.on_item {
                hook(index);
            }
            if self.fail_items.contains(&index) {
                return Err(PageError::Browser(format!("item {} detached", index)));
            }
            self.cards
                .get(index)
                .cloned()
                .ok_or_else(|| PageError::Script(format!("no item {}", index)))
        }

        fn activate_item(&self, _strategies: &[&str], index: usize, _targets: &[&str]) -> Result<bool, PageError> {
            if !self.activatable || self.no_link.contains(&index) {
                return Ok(false);
            }
            self.state.lock().unwrap().active = Some(index);
            Ok(true)
        }

        fn detail_html(&self, _strategies: &[&str]) -> Result<String, PageError> {
            let active = self.state.lock().unwrap().active;
            Ok(active
                .and_then(|i| self.details.get(i).cloned())
                .unwrap_or_default())
        }

        fn accept_consent(&self, _strategies: &[&str]) -> Result<bool, PageError> {
            if !self.consent_wall {
                return Ok(false);
            }
            self.state.lock().unwrap().consent_accepted = true;
            Ok(true)
        }

        fn focus_search(&self, _strategies: &[&str]) -> Result<bool, PageError> {
            // A pending consent dialog hides the search box.
            Ok(self.has_search && (!self.consent_wall || self.state.lock().unwrap().consent_accepted))
        }

        fn type_char(&self, ch: char) -> Result<(), PageError> {
            self.state.lock().unwrap().typed.push(ch);
            Ok(())
        }

        fn submit_search(&self, _strategies: &[&str]) -> Result<(), PageError> {
            self.state.lock().unwrap().submitted = true;
            Ok(())
        }

        fn close(&self) -> Result<(), PageError> {
            self.state.lock().unwrap().closed = true;
            Ok(())
        }
    }

    /// Hands out pre-built pages in order, one per provision call. A `None`
    /// slot refuses to open.
    pub struct FakeProvisioner {
        pub pages: Mutex<Vec<Option<Arc<FakePage>>>>,
        pub opened: Mutex<Vec<(String, TabMode)>>,
        pub on_open: Option<Box<dyn Fn() + Send + Sync>>,
    }

    impl FakeProvisioner {
        pub fn new(pages: Vec<Option<Arc<FakePage>>>) -> Self {
            FakeProvisioner {
                pages: Mutex::new(pages),
                opened: Mutex::new(Vec::new()),
                on_open: None,
            }
        }
    }

    impl PageProvisioner for FakeProvisioner {
        fn provision(&self, url: &str, mode: TabMode) -> Result<Arc<dyn MapsPage>, PageError> {
            if let Some(hook) = &self.on_open {
                hook();
            }
            self.opened.lock().unwrap().push((url.to_string(), mode));
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                return Err(PageError::Closed);
            }
            match pages.remove(0) {
                Some(page) => {
                    let page: Arc<dyn MapsPage> = page;
                    Ok(page)
                }
                None => Err(PageError::Launch("tab refused".into())),
            }
        }
    }
}
