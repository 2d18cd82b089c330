//! Where things live on the results page.
//!
//! The page's markup changes without notice, so every location is a list of
//! strategies tried in order. The first strategy that yields a non-empty value
//! wins; a strategy that matches nothing simply falls through.

use scraper::{Html, Selector};
use url::Url;

use crate::record::{collapse_whitespace, Lookup};

/// What to read from a matched element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    Text,
    Attr(&'static str),
    /// An attribute that must hold an absolute http(s) URL.
    Url(&'static str),
}

/// Which snapshot a rule runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The result item itself.
    Card,
    /// The shared panel populated after an item is opened.
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub selector: &'static str,
    pub read: Read,
    pub scope: Scope,
    pub strip_prefix: Option<&'static str>,
}

impl FieldRule {
    pub const fn text(selector: &'static str) -> FieldRule {
        FieldRule {
            selector,
            read: Read::Text,
            scope: Scope::Card,
            strip_prefix: None,
        }
    }

    pub const fn attr(selector: &'static str, name: &'static str) -> FieldRule {
        FieldRule {
            selector,
            read: Read::Attr(name),
            scope: Scope::Card,
            strip_prefix: None,
        }
    }

    pub const fn url(selector: &'static str, name: &'static str) -> FieldRule {
        FieldRule {
            selector,
            read: Read::Url(name),
            scope: Scope::Card,
            strip_prefix: None,
        }
    }

    pub const fn in_detail(self) -> FieldRule {
        FieldRule {
            scope: Scope::Detail,
            ..self
        }
    }

    pub const fn strip(self, prefix: &'static str) -> FieldRule {
        FieldRule {
            strip_prefix: Some(prefix),
            ..self
        }
    }

    /// Runs this rule against a parsed snapshot. Only the first matching
    /// element is considered.
    pub fn lookup(&self, doc: &Html) -> Lookup {
        let selector = match Selector::parse(self.selector) {
            Ok(s) => s,
            Err(_) => {
                log::warn!("Skipping unparsable selector '{}'", self.selector);
                return Lookup::Absent;
            }
        };
        let element = match doc.select(&selector).next() {
            Some(el) => el,
            None => return Lookup::Absent,
        };

        let raw = match self.read {
            Read::Text => Some(element.text().collect::<String>()),
            Read::Attr(name) => element.value().attr(name).map(str::to_string),
            Read::Url(name) => element
                .value()
                .attr(name)
                .and_then(|href| Url::parse(href).ok())
                .filter(|u| u.scheme() == "http" || u.scheme() == "https")
                .map(String::from),
        };

        let value = raw.map(|v| {
            let v = collapse_whitespace(&v);
            match self.strip_prefix {
                Some(prefix) => v.strip_prefix(prefix).map(str::trim).unwrap_or(v.as_str()).to_string(),
                None => v,
            }
        });
        Lookup::from_raw(value.as_deref())
    }
}

/// Runs rules in order against the snapshot their scope names.
pub fn first_found(rules: &[FieldRule], card: &Html, detail: &Html) -> Lookup {
    rules.iter().fold(Lookup::Absent, |found, rule| {
        found.or_else(|| match rule.scope {
            Scope::Card => rule.lookup(card),
            Scope::Detail => rule.lookup(detail),
        })
    })
}

#[derive(Debug, Clone, Copy)]
pub struct EndMarker {
    pub selector: &'static str,
    pub text: &'static str,
}

/// The full locator table for one target application.
#[derive(Debug, Clone, Copy)]
pub struct Locators {
    pub feed: &'static [&'static str],
    pub end_marker: EndMarker,
    pub items: &'static [&'static str],
    pub open_details: &'static [&'static str],
    pub detail_panel: &'static [&'static str],
    /// "Accept all" on the consent interstitial shown to fresh sessions.
    pub consent_button: &'static [&'static str],
    pub search_input: &'static [&'static str],
    pub search_submit: &'static [&'static str],
    pub name: &'static [FieldRule],
    pub rating: &'static [FieldRule],
    pub review_count: &'static [FieldRule],
    pub category: &'static [FieldRule],
    pub address: &'static [FieldRule],
    pub phone: &'static [FieldRule],
    pub website: &'static [FieldRule],
    pub hours: &'static [FieldRule],
}

impl Locators {
    pub const GOOGLE_MAPS: Locators = Locators {
        feed: &[
            r#"div[role="feed"]"#,
            r#"div[aria-label*="Results for"]"#,
            "div.m6QErb",
        ],
        end_marker: EndMarker {
            selector: "span.HlvSq",
            text: "You've reached the end of the list.",
        },
        items: &[r#"div[role="article"]"#, "div.Nv2PK"],
        open_details: &["a.hfpxzc"],
        detail_panel: &[
            r#"div[role="main"][aria-label]:not([aria-label*="Results for"])"#,
            r#"div[role="main"]"#,
        ],
        consent_button: &[
            r#"button[aria-label="Accept all"]"#,
            "button#L2AGLb",
            r#"form[action*="consent"] button"#,
        ],
        search_input: &["input#searchboxinput", r#"input[name="q"]"#],
        search_submit: &[
            "button#searchbox-searchbutton",
            r#"button[aria-label="Search"]"#,
        ],
        name: &[
            FieldRule::text("div.fontHeadlineSmall"),
            FieldRule::text("div.qBF1Pd"),
            FieldRule::attr("a.hfpxzc", "aria-label"),
        ],
        rating: &[
            FieldRule::text("span.MW4etd"),
            FieldRule::attr("span.ZkP5Je", "aria-label"),
        ],
        review_count: &[FieldRule::text("span.UY7F9")],
        category: &[
            FieldRule::text("button.DkEaL").in_detail(),
            FieldRule::text(r#"span.DkEaL"#).in_detail(),
            FieldRule::text("div.W4Efsd span > span"),
        ],
        address: &[
            FieldRule::text(r#"button[data-item-id="address"] div.Io6YTe"#).in_detail(),
            FieldRule::attr(r#"button[data-item-id="address"]"#, "aria-label")
                .in_detail()
                .strip("Address:"),
        ],
        phone: &[
            FieldRule::text(r#"button[data-item-id^="phone:tel:"] div.Io6YTe"#).in_detail(),
            FieldRule::attr(r#"button[aria-label^="Phone:"]"#, "aria-label")
                .in_detail()
                .strip("Phone:"),
            FieldRule::text("span.UsdlK"),
        ],
        website: &[
            FieldRule::url(r#"a[data-item-id="authority"]"#, "href").in_detail(),
            FieldRule::url(r#"a[data-tooltip="Open website"]"#, "href").in_detail(),
            FieldRule::url(r#"a[data-value="Website"]"#, "href").in_detail(),
            FieldRule::url(r#"a[data-value="Website"]"#, "href"),
        ],
        hours: &[
            FieldRule::attr("div.t39EBf", "aria-label").in_detail(),
            FieldRule::attr(r#"div[aria-label*="Hide open hours"]"#, "aria-label").in_detail(),
            FieldRule::text("span.ZDu9vd").in_detail(),
        ],
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    #[test]
    fn first_strategy_wins_over_later_ones() {
        let card = doc(r#"<div><div class="fontHeadlineSmall">Primary</div><a class="hfpxzc" aria-label="Secondary"></a></div>"#);
        let empty = doc("");
        let name = first_found(Locators::GOOGLE_MAPS.name, &card, &empty);
        assert_eq!(name, Lookup::Found("Primary".into()));
    }

    #[test]
    fn falls_through_to_attribute_strategy() {
        let card = doc(r#"<div><a class="hfpxzc" aria-label="Only Label"></a></div>"#);
        let empty = doc("");
        let name = first_found(Locators::GOOGLE_MAPS.name, &card, &empty);
        assert_eq!(name, Lookup::Found("Only Label".into()));
    }

    #[test]
    fn empty_match_counts_as_absent() {
        let card = doc(r#"<div><div class="fontHeadlineSmall">   </div></div>"#);
        let empty = doc("");
        assert_eq!(first_found(Locators::GOOGLE_MAPS.name, &card, &empty), Lookup::Absent);
    }

    #[test]
    fn detail_rules_read_the_detail_snapshot() {
        let card = doc("<div></div>");
        let detail = doc(r#"<div role="main"><button data-item-id="address" aria-label="Address: 9 Elm St, Springfield"></button></div>"#);
        let address = first_found(Locators::GOOGLE_MAPS.address, &card, &detail);
        assert_eq!(address, Lookup::Found("9 Elm St, Springfield".into()));
    }

    #[test]
    fn url_rule_rejects_relative_links() {
        let card = doc("<div></div>");
        let detail = doc(r#"<div><a data-item-id="authority" href="/url?q=x"></a><a data-tooltip="Open website" href="https://shop.example.com/"></a></div>"#);
        let website = first_found(Locators::GOOGLE_MAPS.website, &card, &detail);
        assert_eq!(website, Lookup::Found("https://shop.example.com/".into()));
    }

    #[test]
    fn every_strategy_parses() {
        let loc = Locators::GOOGLE_MAPS;
        let lists = [
            loc.feed,
            loc.items,
            loc.open_details,
            loc.detail_panel,
            loc.consent_button,
            loc.search_input,
            loc.search_submit,
        ];
        for selector in lists.iter().flat_map(|l| l.iter()).chain([&loc.end_marker.selector]) {
            assert!(Selector::parse(selector).is_ok(), "{}", selector);
        }
    }

    #[test]
    fn bad_selector_is_absent_not_fatal() {
        let rule = FieldRule::text("div[[[");
        assert_eq!(rule.lookup(&doc("<div></div>")), Lookup::Absent);
    }
}
