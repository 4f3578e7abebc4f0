//! Import error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

use crate::normalizer::fields::CanonicalField;
use crate::session::ImportStep;

pub type ImportResult<T, E = ImportError> = Result<T, E>;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Unsupported file type: .{0}. Supported: .xlsx, .xlsm, .xlsb, .xls, .ods, .csv")]
    UnsupportedFile(String),
    #[error("Failed to read file. Make sure it's a valid Excel or CSV file.")]
    Unreadable(#[source] anyhow::Error),
    #[error("The file is empty or has no data rows.")]
    NoDataRows,
    #[error("Missing required columns: {}", join_fields(.0))]
    MissingRequired(Vec<CanonicalField>),
    #[error("Import is in step '{actual}', expected '{expected}'")]
    InvalidStep {
        expected: ImportStep,
        actual: ImportStep,
    },
    #[error("Import is still running")]
    Busy,
}

impl ImportError {
    /// Parse failures are fatal to the upload and reset the session.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFile(_) | Self::Unreadable(_) | Self::NoDataRows
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedFile(_) | Self::Unreadable(_) | Self::NoDataRows => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::MissingRequired(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidStep { .. } | Self::Busy => StatusCode::CONFLICT,
        }
    }
}

fn join_fields(fields: &[CanonicalField]) -> String {
    fields
        .iter()
        .map(|f| f.path())
        .collect::<Vec<_>>()
        .join(", ")
}
