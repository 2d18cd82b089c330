//! Request/response envelopes for the hosting-context messaging protocol.

use serde::{Deserialize, Serialize};

use crate::exporter::Columns;
use crate::record::Record;
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    StartScraping,
    TogglePause,
    GetData,
    GetState,
    Cleanup,
    StartBatchScrape {
        #[serde(rename = "businessTypes")]
        business_types: Vec<String>,
    },
    /// Types a query into the hosted page's search box.
    Search { query: String },
    /// Writes the hosted session's records to the output directory.
    Export {
        #[serde(default)]
        columns: Option<Columns>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Outcome(Outcome),
    Paused(PauseReply),
    Data(DataReply),
    State(SessionSnapshot),
    Exported(ExportReply),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn ok() -> Self {
        Outcome {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Outcome {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseReply {
    pub is_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataReply {
    pub data: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
