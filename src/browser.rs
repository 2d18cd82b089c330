//! Live page backend driving Chrome over the DevTools protocol.
//!
//! All DOM access goes through small JavaScript functions evaluated in the
//! tab. Selector strategy lists are passed in as JSON literals, so nothing
//! from the page or the caller is ever spliced into script text unquoted.

use std::sync::Arc;

use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, info, warn};
use rand::Rng;
use serde_json::{json, Value};

use crate::config::{BrowserOptions, TabMode, BASE_URL};
use crate::page::{MapsPage, PageError, PageProvisioner};

const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
];

/// Returns every node matched by the first strategy that matches anything.
const PICK: &str = "const pick = (ss) => { for (const s of ss) { const n = document.querySelectorAll(s); if (n.length) return Array.from(n); } return []; };";

const LOCATE_FEED: &str =
    "(ss) => { for (let i = 0; i < ss.length; i++) { if (document.querySelector(ss[i])) return i; } return -1; }";
const SCROLL_FEED: &str =
    "(s) => { const f = document.querySelector(s); if (!f) return false; f.scrollTop = f.scrollHeight; return true; }";
const FEED_EXTENT: &str = "(s) => { const f = document.querySelector(s); return f ? f.scrollHeight : 0; }";
const FEED_HAS_TEXT: &str = "(s, m, t) => { const f = document.querySelector(s); if (!f) return false; return Array.from(f.querySelectorAll(m)).some((e) => (e.textContent || '').includes(t)); }";
const ITEM_COUNT: &str = "(ss) => pick(ss).length";
const ITEM_HTML: &str = "(ss, i) => { const n = pick(ss)[i]; return n ? n.outerHTML : null; }";
const ACTIVATE_ITEM: &str = "(ss, i, ts) => { const n = pick(ss)[i]; if (!n) return false; for (const t of ts) { const a = n.querySelector(t); if (a) { a.click(); return true; } } return false; }";
// The most recently opened panel is rendered last.
const DETAIL_HTML: &str = "(ss) => { const n = pick(ss); return n.length ? n[n.length - 1].outerHTML : ''; }";
const FOCUS_SEARCH: &str = "(ss) => { const n = pick(ss)[0]; if (!n) return false; n.click(); n.focus(); n.value = ''; return true; }";
const CLICK_FIRST: &str = "(ss) => { const n = pick(ss)[0]; if (!n) return false; n.click(); return true; }";

pub fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}

/// Search results location for a free-text query.
pub fn search_url(query: &str) -> String {
    format!("{}/search/{}", BASE_URL, urlencoding::encode(query.trim()))
}

/// Wraps `func` in an immediately-invoked expression with JSON arguments.
fn script(func: &str, args: &[Value]) -> String {
    let args: Vec<String> = args.iter().map(Value::to_string).collect();
    format!("(() => {{ {} return ({})({}); }})()", PICK, func, args.join(", "))
}

fn expect_bool(value: Value, what: &str) -> Result<bool, PageError> {
    value
        .as_bool()
        .ok_or_else(|| PageError::Script(format!("{} returned {}", what, value)))
}

fn expect_u64(value: Value, what: &str) -> Result<u64, PageError> {
    value
        .as_f64()
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
        .ok_or_else(|| PageError::Script(format!("{} returned {}", what, value)))
}

/// Owns the Chrome process. Each provisioned page is a new tab.
pub struct ChromeProvisioner {
    browser: Browser,
}

impl ChromeProvisioner {
    pub fn launch(options: &BrowserOptions) -> Result<Self, PageError> {
        let launch = LaunchOptions::default_builder()
            .headless(options.headless)
            .window_size(Some((options.window_width, options.window_height)))
            .build()
            .map_err(|e| PageError::Launch(e.to_string()))?;
        let browser = Browser::new(launch).map_err(|e| PageError::Launch(format!("{:#}", e)))?;
        info!(
            "Browser launched ({}, {}x{})",
            if options.headless { "headless" } else { "headed" },
            options.window_width,
            options.window_height
        );
        Ok(ChromeProvisioner { browser })
    }

    pub fn open(&self, url: &str, mode: TabMode) -> Result<ChromePage, PageError> {
        let tab = self.browser.new_tab()?;
        let agent = random_user_agent();
        debug!("Opening {} as {}", url, agent);
        tab.set_user_agent(agent, Some("en-US,en;q=0.9"), None)?;
        tab.navigate_to(url)?;
        if mode == TabMode::Foreground {
            tab.activate()?;
        }
        Ok(ChromePage { tab })
    }
}

impl PageProvisioner for ChromeProvisioner {
    fn provision(&self, url: &str, mode: TabMode) -> Result<Arc<dyn MapsPage>, PageError> {
        Ok(Arc::new(self.open(url, mode)?))
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl ChromePage {
    fn call(&self, func: &str, args: &[Value]) -> Result<Value, PageError> {
        let remote = self.tab.evaluate(&script(func, args), false)?;
        Ok(remote.value.unwrap_or(Value::Null))
    }
}

impl MapsPage for ChromePage {
    fn wait_until_loaded(&self) -> Result<(), PageError> {
        self.tab.wait_until_navigated()?;
        Ok(())
    }

    fn locate_feed(&self, strategies: &[&str]) -> Result<Option<usize>, PageError> {
        let found = self.call(LOCATE_FEED, &[json!(strategies)])?;
        Ok(found.as_i64().filter(|i| *i >= 0).map(|i| i as usize))
    }

    fn scroll_feed(&self, feed: &str) -> Result<(), PageError> {
        if !expect_bool(self.call(SCROLL_FEED, &[json!(feed)])?, "scroll")? {
            warn!("Feed {} vanished while scrolling", feed);
        }
        Ok(())
    }

    fn feed_extent(&self, feed: &str) -> Result<u64, PageError> {
        expect_u64(self.call(FEED_EXTENT, &[json!(feed)])?, "feed extent")
    }

    fn feed_has_text(&self, feed: &str, marker: &str, needle: &str) -> Result<bool, PageError> {
        let found = self.call(FEED_HAS_TEXT, &[json!(feed), json!(marker), json!(needle)])?;
        expect_bool(found, "end marker")
    }

    fn item_count(&self, strategies: &[&str]) -> Result<usize, PageError> {
        Ok(expect_u64(self.call(ITEM_COUNT, &[json!(strategies)])?, "item count")? as usize)
    }

    fn item_html(&self, strategies: &[&str], index: usize) -> Result<String, PageError> {
        match self.call(ITEM_HTML, &[json!(strategies), json!(index)])? {
            Value::String(html) => Ok(html),
            _ => Err(PageError::Script(format!("item {} is no longer rendered", index))),
        }
    }

    fn activate_item(&self, strategies: &[&str], index: usize, targets: &[&str]) -> Result<bool, PageError> {
        let clicked = self.call(ACTIVATE_ITEM, &[json!(strategies), json!(index), json!(targets)])?;
        expect_bool(clicked, "activate")
    }

    fn detail_html(&self, strategies: &[&str]) -> Result<String, PageError> {
        Ok(self
            .call(DETAIL_HTML, &[json!(strategies)])?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    fn accept_consent(&self, strategies: &[&str]) -> Result<bool, PageError> {
        expect_bool(self.call(CLICK_FIRST, &[json!(strategies)])?, "consent")
    }

    fn focus_search(&self, strategies: &[&str]) -> Result<bool, PageError> {
        expect_bool(self.call(FOCUS_SEARCH, &[json!(strategies)])?, "focus search")
    }

    fn type_char(&self, ch: char) -> Result<(), PageError> {
        let mut buf = [0u8; 4];
        self.tab.type_str(ch.encode_utf8(&mut buf))?;
        Ok(())
    }

    fn submit_search(&self, strategies: &[&str]) -> Result<(), PageError> {
        if !expect_bool(self.call(CLICK_FIRST, &[json!(strategies)])?, "submit")? {
            debug!("No search button, pressing Enter");
            self.tab.press_key("Enter")?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), PageError> {
        self.tab.close(true)?;
        Ok(())
    }
}
