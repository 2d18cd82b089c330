use std::time::Duration;

use log::{debug, warn};
use regex::Regex;
use scraper::Html;

use crate::delay_manager;
use crate::locators::{first_found, Locators};
use crate::page::ItemHandle;
use crate::record::{Extraction, Lookup, Record};

const PHONE_PATTERN: &str = r"(?:\+?\d{1,4}[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?)?\d{3}[-.\s]?\d{4}";

pub struct Extractor {
    locators: &'static Locators,
    detail_settle: Duration,
    phone_regex: Regex,
}

impl Extractor {
    pub fn new(locators: &'static Locators, detail_settle: Duration) -> Self {
        Extractor {
            locators,
            detail_settle,
            phone_regex: Regex::new(PHONE_PATTERN).expect("phone pattern is valid"),
        }
    }

    /// Reads one result item. Every optional field is best-effort; only a
    /// missing name makes the item unusable.
    pub fn extract(&self, item: &ItemHandle<'_>) -> Extraction {
        let index = item.index();
        let card = match item.html() {
            Ok(html) => Html::parse_fragment(&html),
            Err(e) => {
                warn!("Could not read item {}: {}", index, e);
                return Extraction::Unusable;
            }
        };
        let empty = Html::parse_fragment("");
        let loc = self.locators;

        let name = match first_found(loc.name, &card, &empty) {
            Lookup::Found(name) => name,
            Lookup::Absent => {
                warn!("No name found for item {}", index);
                return Extraction::Unusable;
            }
        };

        let rating = first_found(loc.rating, &card, &empty);
        let review_count = match first_found(loc.review_count, &card, &empty) {
            Lookup::Found(v) => Lookup::from_raw(Some(v.trim_matches(|c| c == '(' || c == ')'))),
            Lookup::Absent => Lookup::Absent,
        };

        // The panel is shared: unless this item opened it, it still shows
        // whichever business was opened last.
        let opened = match item.activate(loc.open_details) {
            Ok(true) => {
                delay_manager::settle(self.detail_settle, "detail panel");
                true
            }
            Ok(false) => {
                debug!("Item {} has no details affordance", index);
                false
            }
            Err(e) => {
                debug!("Could not open details for item {}: {}", index, e);
                false
            }
        };

        let detail = if opened {
            match item.detail_html(loc.detail_panel) {
                Ok(html) => Html::parse_fragment(&html),
                Err(e) => {
                    debug!("Detail panel unavailable for item {}: {}", index, e);
                    Html::parse_fragment("")
                }
            }
        } else {
            Html::parse_fragment("")
        };

        let phone = first_found(loc.phone, &card, &detail).or_else(|| self.scan_phone(&detail));

        let record = Record {
            name,
            rating: rating.into_value(),
            review_count: review_count.into_value(),
            category: first_found(loc.category, &card, &detail).into_value(),
            address: first_found(loc.address, &card, &detail).into_value(),
            phone: phone.into_value(),
            website: first_found(loc.website, &card, &detail).into_value(),
            hours: first_found(loc.hours, &card, &detail).into_value(),
        };
        debug!("Scraped: {}", record.name);
        Extraction::Usable(record)
    }

    /// Last resort for the phone field: any phone-shaped run in the panel text.
    fn scan_phone(&self, detail: &Html) -> Lookup {
        let text = detail.root_element().text().collect::<Vec<_>>().join("\n");
        let found = self.phone_regex.find_iter(&text).find(|m| {
            let digits = m.as_str().chars().filter(|c| c.is_ascii_digit()).count();
            (10..=13).contains(&digits)
        });
        Lookup::from_raw(found.map(|m| m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::{card, detail, nameless_card, FakePage};

    fn extractor() -> Extractor {
        Extractor::new(&Locators::GOOGLE_MAPS, Duration::ZERO)
    }

    fn extract_at(page: &FakePage, index: usize) -> Extraction {
        let items = Locators::GOOGLE_MAPS.items;
        extractor().extract(&ItemHandle::new(page, items, index))
    }

    #[test]
    fn full_record_from_card_and_detail() {
        let page = FakePage::new(vec![card("Joe's Bakery", "4.6", "1,204")]).with_details(vec![detail(
            "Bakery",
            "12 High St, Springfield",
            "(555) 010-2000",
            "https://joes.example.com/",
        )]);

        let record = match extract_at(&page, 0) {
            Extraction::Usable(r) => r,
            Extraction::Unusable => panic!("expected a record"),
        };
        assert_eq!(record.name, "Joe's Bakery");
        assert_eq!(record.rating, "4.6");
        assert_eq!(record.review_count, "1,204");
        assert_eq!(record.category, "Bakery");
        assert_eq!(record.address, "12 High St, Springfield");
        assert_eq!(record.phone, "(555) 010-2000");
        assert_eq!(record.website, "https://joes.example.com/");
        assert_eq!(record.hours, "Open 7 AM to 6 PM");
    }

    #[test]
    fn missing_name_is_unusable() {
        let page = FakePage::new(vec![nameless_card()]);
        assert_eq!(extract_at(&page, 0), Extraction::Unusable);
    }

    #[test]
    fn unreadable_item_is_unusable() {
        let mut page = FakePage::new(vec![card("A", "4", "1")]);
        page.fail_items = vec![0];
        assert_eq!(extract_at(&page, 0), Extraction::Unusable);
    }

    #[test]
    fn missing_detail_panel_leaves_optional_fields_empty() {
        let mut page = FakePage::new(vec![card("Corner Shop", "3.9", "8")]);
        page.activatable = false;

        let record = match extract_at(&page, 0) {
            Extraction::Usable(r) => r,
            Extraction::Unusable => panic!("expected a record"),
        };
        assert_eq!(record.name, "Corner Shop");
        assert_eq!(record.rating, "3.9");
        assert_eq!(record.review_count, "8");
        assert!(record.address.is_empty());
        assert!(record.phone.is_empty());
        assert!(record.website.is_empty());
        assert!(record.hours.is_empty());
    }

    #[test]
    fn unopened_item_does_not_inherit_the_previous_panel() {
        let mut page = FakePage::new(vec![card("Crumbs", "4.8", "210"), card("Plumb Co", "4.0", "12")]).with_details(vec![
            detail("Bakery", "1 Oven Rd", "(555) 100-0001", "https://crumbs.example/"),
            String::new(),
        ]);
        page.no_link = vec![1];

        assert!(matches!(extract_at(&page, 0), Extraction::Usable(ref r) if r.category == "Bakery"));
        let record = match extract_at(&page, 1) {
            Extraction::Usable(r) => r,
            Extraction::Unusable => panic!("expected a record"),
        };
        assert_eq!(record.name, "Plumb Co");
        assert_eq!(record.review_count, "12");
        assert!(record.category.is_empty());
        assert!(record.address.is_empty());
        assert!(record.phone.is_empty());
        assert!(record.website.is_empty());
        assert!(record.hours.is_empty());
    }

    #[test]
    fn phone_falls_back_to_panel_text() {
        let panel = r#"<div role="main"><div class="rogA2c">Call us at +1 555-867-5309 today</div></div>"#;
        let page = FakePage::new(vec![card("Plumbers R Us", "4.1", "30")]).with_details(vec![panel.to_string()]);

        let record = match extract_at(&page, 0) {
            Extraction::Usable(r) => r,
            Extraction::Unusable => panic!("expected a record"),
        };
        assert_eq!(record.phone, "+1 555-867-5309");
        assert!(record.category.is_empty());
    }

    #[test]
    fn short_digit_runs_are_not_phones() {
        let detail = Html::parse_fragment("<div>Suite 1200, zip 90210</div>");
        assert_eq!(extractor().scan_phone(&detail), Lookup::Absent);
    }
}
