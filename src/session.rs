//! Import flow state machine: upload → preview → importing → done.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{info, warn};

use crate::apprehension::{now_iso8601, ApprehensionInput, BulkImportSummary};
use crate::error::{ImportError, ImportResult};
use crate::normalizer::mapping::HeaderTable;
use crate::normalizer::validate::ValidationResult;
use crate::normalizer::{self, ColumnReport, NormalizedSheet};
use crate::sheet_parser;

/// Rows shown per preview page unless the caller asks otherwise.
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStep {
    Upload,
    Preview,
    Importing,
    Done,
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Upload => "upload",
            Self::Preview => "preview",
            Self::Importing => "importing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What the user sees once a submission resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    /// A transport failure marks the whole batch as failed.
    pub fn from_outcome(outcome: anyhow::Result<BulkImportSummary>, submitted: usize) -> Self {
        match outcome {
            Ok(summary) => Self {
                success: summary.imported,
                failed: summary.failed,
                errors: summary.errors.iter().map(|e| e.to_line()).collect(),
            },
            Err(e) => Self {
                success: 0,
                failed: submitted,
                errors: vec![e.to_string()],
            },
        }
    }
}

/// One normalized record with its source row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRecord {
    pub sheet_row: usize,
    #[serde(flatten)]
    pub record: ApprehensionInput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsPage {
    pub records: Vec<PreviewRecord>,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub step: ImportStep,
    pub file_name: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: String,
    /// 1-based.
    pub header_row: Option<usize>,
    pub total_records: usize,
    pub columns: Vec<ColumnReport>,
    pub validation: Option<ValidationResult>,
    pub warnings: Vec<String>,
    pub preview: RecordsPage,
    pub result: Option<ImportReport>,
}

/// State of one import attempt. Owns its sheet and results exclusively.
#[derive(Debug, Clone)]
pub struct ImportSession {
    step: ImportStep,
    file_name: Option<String>,
    content_hash: Option<String>,
    created_at: String,
    sheet: Option<NormalizedSheet>,
    result: Option<ImportReport>,
}

impl Default for ImportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportSession {
    pub fn new() -> Self {
        Self {
            step: ImportStep::Upload,
            file_name: None,
            content_hash: None,
            created_at: now_iso8601(),
            sheet: None,
            result: None,
        }
    }

    pub fn step(&self) -> ImportStep {
        self.step
    }

    pub fn records(&self) -> &[ApprehensionInput] {
        self.sheet.as_ref().map(|s| s.records.as_slice()).unwrap_or(&[])
    }

    /// Parse and normalize an uploaded file, moving to `Preview`.
    ///
    /// Any parse failure leaves the session in `Upload` with nothing retained.
    pub fn load(&mut self, filename: &str, data: &[u8], table: &HeaderTable) -> ImportResult<()> {
        self.expect_step(ImportStep::Upload)?;

        let outcome = sheet_parser::parse_file(filename, data)
            .and_then(|sheet| normalizer::normalize(&sheet, table));

        let normalized = match outcome {
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to load '{}': {:?}", filename, e);
                self.clear();
                return Err(e);
            }
        };

        self.content_hash = Some({
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        });
        self.file_name = Some(filename.to_string());
        info!(
            "Loaded '{}' ({} bytes): {} records ready for preview",
            filename,
            data.len(),
            normalized.records.len()
        );
        self.sheet = Some(normalized);
        self.step = ImportStep::Preview;
        Ok(())
    }

    /// Move to `Importing` and hand back the records to submit.
    pub fn begin_import(&mut self) -> ImportResult<Vec<ApprehensionInput>> {
        self.expect_step(ImportStep::Preview)?;

        if let Some(sheet) = &self.sheet {
            if !sheet.validation.can_import() {
                return Err(ImportError::MissingRequired(
                    sheet.validation.missing_required.clone(),
                ));
            }
        }

        self.step = ImportStep::Importing;
        Ok(self.records().to_vec())
    }

    /// Record the submission outcome and move to `Done`, success or not.
    pub fn finish(&mut self, outcome: anyhow::Result<BulkImportSummary>) -> ImportResult<&ImportReport> {
        self.expect_step(ImportStep::Importing)?;

        if let Err(e) = &outcome {
            warn!("Bulk import request failed: {:#}", e);
        }
        let report = ImportReport::from_outcome(outcome, self.records().len());
        info!(
            "Import of '{}' done: {} succeeded, {} failed",
            self.file_name.as_deref().unwrap_or_default(),
            report.success,
            report.failed
        );

        self.step = ImportStep::Done;
        Ok(&*self.result.insert(report))
    }

    /// Drop everything and return to `Upload`.
    pub fn reset(&mut self) -> ImportResult<()> {
        if self.step == ImportStep::Importing {
            return Err(ImportError::Busy);
        }
        self.clear();
        Ok(())
    }

    pub fn preview(&self, offset: usize, limit: Option<usize>) -> RecordsPage {
        let limit = limit.unwrap_or(DEFAULT_PREVIEW_LIMIT);
        let (records, total) = match &self.sheet {
            Some(sheet) => {
                let page = sheet
                    .rows
                    .iter()
                    .zip(&sheet.records)
                    .skip(offset)
                    .take(limit)
                    .map(|(row, record)| PreviewRecord {
                        sheet_row: row.sheet_row,
                        record: record.clone(),
                    })
                    .collect();
                (page, sheet.records.len())
            }
            None => (Vec::new(), 0),
        };

        RecordsPage {
            records,
            offset,
            limit,
            total,
            has_more: offset.saturating_add(limit) < total,
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        let Some(sheet) = &self.sheet else {
            return Vec::new();
        };

        let mut warnings = Vec::new();
        let validation = &sheet.validation;
        if !validation.missing_required.is_empty() {
            warnings.push(
                ImportError::MissingRequired(validation.missing_required.clone()).to_string(),
            );
        }
        if validation.unmapped_count > 0 {
            warnings.push(format!(
                "{} column(s) could not be mapped and will be ignored.",
                validation.unmapped_count
            ));
        }
        warnings
    }

    pub fn snapshot(&self, id: &str) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_string(),
            step: self.step,
            file_name: self.file_name.clone(),
            content_hash: self.content_hash.clone(),
            created_at: self.created_at.clone(),
            header_row: self.sheet.as_ref().map(|s| s.header_row + 1),
            total_records: self.records().len(),
            columns: self
                .sheet
                .as_ref()
                .map(|s| s.columns.clone())
                .unwrap_or_default(),
            validation: self.sheet.as_ref().map(|s| s.validation.clone()),
            warnings: self.warnings(),
            preview: self.preview(0, None),
            result: self.result.clone(),
        }
    }

    fn expect_step(&self, expected: ImportStep) -> ImportResult<()> {
        if self.step != expected {
            return Err(ImportError::InvalidStep {
                expected,
                actual: self.step,
            });
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.step = ImportStep::Upload;
        self.file_name = None;
        self.content_hash = None;
        self.sheet = None;
        self.result = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::ApprehensionSink;
    use crate::apprehension::RowError;
    use crate::normalizer::fields::CanonicalField;

    const CSV: &str = "DATE OF APPREHENSION,AGENCY,CASE NUMBER,VIOLATION,DRIVER/OPERATOR,,PLATE NO.,PLACE OF APPREHENSION\n\
        ,,,,Last Name,First Name,,\n\
        2025-03-01,PNP,CASE-001,Illegal Parking,Dela Cruz,Juan,ABC1234,EDSA\n\
        2025-03-02,MMDA,CASE-002,Speeding,Santos,Maria,XYZ987,Cubao\n";

    struct MockSink {
        fail_row: Option<usize>,
        transport_error: bool,
    }

    #[async_trait::async_trait]
    impl ApprehensionSink for MockSink {
        async fn bulk_import(
            &self,
            records: &[ApprehensionInput],
        ) -> anyhow::Result<BulkImportSummary> {
            if self.transport_error {
                anyhow::bail!("connection refused");
            }
            let errors: Vec<RowError> = self
                .fail_row
                .map(|row| RowError {
                    row,
                    error: "Duplicate case number".to_string(),
                })
                .into_iter()
                .collect();
            Ok(BulkImportSummary {
                imported: records.len() - errors.len(),
                failed: errors.len(),
                errors,
            })
        }
    }

    fn loaded() -> ImportSession {
        let mut session = ImportSession::new();
        session
            .load("records.csv", CSV.as_bytes(), &HeaderTable::builtin())
            .unwrap();
        session
    }

    #[test]
    fn test_load_moves_to_preview() {
        let session = loaded();
        assert_eq!(session.step(), ImportStep::Preview);
        assert_eq!(session.records().len(), 2);
        assert_eq!(session.records()[1].driver.first_name, "Maria");
        assert!(session.warnings().is_empty());

        let snapshot = session.snapshot("imp_1");
        assert_eq!(snapshot.file_name.as_deref(), Some("records.csv"));
        assert_eq!(snapshot.header_row, Some(1));
        assert_eq!(snapshot.content_hash.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_parse_failure_retains_nothing() {
        let mut session = ImportSession::new();
        let err = session
            .load("notes.csv", b"AGENCY,VIOLATION,PLATE\n", &HeaderTable::builtin())
            .unwrap_err();
        assert_eq!(err.to_string(), "The file is empty or has no data rows.");
        assert_eq!(session.step(), ImportStep::Upload);
        assert!(session.snapshot("x").file_name.is_none());

        let err = session
            .load("notes.txt", b"hello", &HeaderTable::builtin())
            .unwrap_err();
        assert!(err.is_parse_failure());
        assert_eq!(session.step(), ImportStep::Upload);
    }

    #[test]
    fn test_missing_required_blocks_import() {
        let mut session = ImportSession::new();
        let csv = "AGENCY,VIOLATION,BADGE\n,,\nPNP,Speeding,red\n";
        session
            .load("partial.csv", csv.as_bytes(), &HeaderTable::builtin())
            .unwrap();

        let warnings = session.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].starts_with("Missing required columns: dateOfApprehension"));
        assert_eq!(warnings[1], "1 column(s) could not be mapped and will be ignored.");

        let err = session.begin_import().unwrap_err();
        assert!(matches!(err, ImportError::MissingRequired(ref f) if f.contains(&CanonicalField::CaseNumber)));
        assert_eq!(session.step(), ImportStep::Preview);
    }

    #[test]
    fn test_preview_pagination() {
        let session = loaded();
        let page = session.preview(0, Some(1));
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total, 2);
        assert!(page.has_more);
        assert_eq!(page.records[0].sheet_row, 3);

        let page = session.preview(1, None);
        assert_eq!(page.limit, DEFAULT_PREVIEW_LIMIT);
        assert_eq!(page.records[0].record.case_number, "CASE-002");
        assert!(!page.has_more);

        assert!(session.preview(5, None).records.is_empty());
    }

    #[tokio::test]
    async fn test_submit_with_row_failure() {
        let mut session = loaded();
        let records = session.begin_import().unwrap();
        assert_eq!(session.step(), ImportStep::Importing);
        assert!(matches!(session.reset(), Err(ImportError::Busy)));

        let sink = MockSink {
            fail_row: Some(2),
            transport_error: false,
        };
        let outcome = sink.bulk_import(&records).await;
        let report = session.finish(outcome).unwrap();
        assert_eq!(report.success, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors, vec!["Row 2: Duplicate case number"]);
        assert_eq!(session.step(), ImportStep::Done);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_whole_batch() {
        let mut session = loaded();
        let records = session.begin_import().unwrap();
        let sink = MockSink {
            fail_row: None,
            transport_error: true,
        };
        let report = session.finish(sink.bulk_import(&records).await).unwrap().clone();
        assert_eq!(
            report,
            ImportReport {
                success: 0,
                failed: 2,
                errors: vec!["connection refused".to_string()],
            }
        );
        assert_eq!(session.step(), ImportStep::Done);
    }

    #[test]
    fn test_step_guards() {
        let mut session = ImportSession::new();
        assert!(matches!(
            session.begin_import(),
            Err(ImportError::InvalidStep { expected: ImportStep::Preview, actual: ImportStep::Upload })
        ));
        assert!(session.finish(Err(anyhow::anyhow!("x"))).is_err());

        let mut session = loaded();
        assert!(session
            .load("records.csv", CSV.as_bytes(), &HeaderTable::builtin())
            .is_err());
        session.reset().unwrap();
        assert_eq!(session.step(), ImportStep::Upload);
        assert!(session.records().is_empty());
    }

    #[test]
    fn test_step_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ImportStep::Importing).unwrap(), "importing");
        assert_eq!(ImportStep::Done.to_string(), "done");
    }
}
