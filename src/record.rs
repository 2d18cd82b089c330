use serde::{Deserialize, Serialize};

/// One business listing. Only `name` is mandatory; every other field is empty
/// when the page did not expose it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub name: String,
    pub rating: String,
    pub review_count: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub hours: String,
}

/// Outcome of reading one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    Absent,
}

impl Lookup {
    /// Empty or whitespace-only values count as absent.
    pub fn from_raw(raw: Option<&str>) -> Lookup {
        match raw.map(collapse_whitespace) {
            Some(v) if !v.is_empty() => Lookup::Found(v),
            _ => Lookup::Absent,
        }
    }

    pub fn or_else<F: FnOnce() -> Lookup>(self, f: F) -> Lookup {
        match self {
            Lookup::Found(_) => self,
            Lookup::Absent => f(),
        }
    }

    pub fn into_value(self) -> String {
        match self {
            Lookup::Found(v) => v,
            Lookup::Absent => String::new(),
        }
    }
}

/// Result of extracting one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Usable(Record),
    /// The mandatory name could not be located.
    Unusable,
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
