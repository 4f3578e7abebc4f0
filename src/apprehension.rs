//! Apprehension record types exchanged with the records backend.
//!
//! Field names match the backend's camelCase JSON contract.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Generate ISO8601 timestamp for current time.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Driver/operator name pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub last_name: String,
    pub first_name: String,
}

/// Item confiscated at apprehension (license, plate, ...).
///
/// Both parts are nullable on the backend; the importer always fills them
/// with strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiscatedItem {
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub number: Option<String>,
}

/// One record submitted to the bulk-import endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprehensionInput {
    pub date_of_submission: String, // YYYY-MM-DD or raw text
    pub date_of_apprehension: String, // YYYY-MM-DD or raw text
    pub time_of_apprehension: String,
    pub agency: String,
    pub apprehending_officer: String,
    pub case_number: String,
    pub driver: Driver,
    pub violation: String,
    pub confiscated_item: ConfiscatedItem,
    pub restriction_code: String,
    pub conditions: String,
    pub nationality: String,
    pub gender: String,
    pub mv_type: String,
    pub plate_number: String,
    pub place_of_apprehension: String,
    pub remarks: String,
}

/// Standard `{data, pagination?}` response envelope of the records API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

/// Outcome of a bulk import as reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkImportSummary {
    pub imported: usize,
    pub failed: usize,
    #[serde(default)]
    pub errors: Vec<RowError>,
}

/// A single row rejected by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub error: String,
}

impl RowError {
    /// Render as the line shown to the user after an import.
    pub fn to_line(&self) -> String {
        format!("Row {}: {}", self.row, self.error)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub access_token: String,
}
