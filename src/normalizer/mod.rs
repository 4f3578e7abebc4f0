//! Sheet import normalizer.
//!
//! Turns the first worksheet of an uploaded file into apprehension records:
//! locate the header row, map header text to canonical fields, extract the
//! data rows, coerce values, and validate the mapping. Pure and synchronous;
//! each call owns its inputs.

pub mod coerce;
pub mod fields;
pub mod header;
pub mod mapping;
pub mod rows;
pub mod validate;

use serde::Serialize;
use tracing::{info, warn};

use crate::apprehension::ApprehensionInput;
use crate::error::{ImportError, ImportResult};
use crate::sheet_parser::RawSheet;
use fields::{ColumnMapping, ColumnTarget};
use header::HeaderContext;
use mapping::{column_letter, HeaderTable};
use rows::RawRecord;
use validate::ValidationResult;

/// How one column was interpreted, for the preview diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnReport {
    pub column: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<String>,
    pub target: ColumnTarget,
}

/// Output of a successful normalization.
#[derive(Debug, Clone)]
pub struct NormalizedSheet {
    pub header_row: usize,
    pub columns: Vec<ColumnReport>,
    pub rows: Vec<RawRecord>,
    pub records: Vec<ApprehensionInput>,
    pub validation: ValidationResult,
}

/// Run the full pipeline over one sheet.
///
/// A sheet with fewer than two rows, or no non-blank data rows, is a
/// `NoDataRows` failure. Missing required columns are reported in the
/// validation result, not as an error.
pub fn normalize(sheet: &RawSheet, table: &HeaderTable) -> ImportResult<NormalizedSheet> {
    if sheet.row_count() < 2 {
        return Err(ImportError::NoDataRows);
    }

    let header_row = header::locate_header_row(sheet);
    let ctx = header::header_context(sheet, header_row);
    let mapping = mapping::map_headers(&ctx, table);
    let raw_rows = rows::extract_rows(sheet, &mapping, ctx.data_start);

    if raw_rows.is_empty() {
        return Err(ImportError::NoDataRows);
    }

    let records = raw_rows.iter().map(coerce::to_input).collect();
    let validation = validate::validate_fields(&mapping);
    let columns = column_reports(&ctx, &mapping);

    info!(
        "Normalized {:?} sheet '{}': header row {}, {} columns, {} records, {} unmapped",
        sheet.source_type,
        sheet.name,
        header_row + 1,
        mapping.len(),
        raw_rows.len(),
        validation.unmapped_count
    );
    if !validation.missing_required.is_empty() {
        warn!(
            "Sheet '{}' is missing required columns: {:?}",
            sheet.name,
            validation
                .missing_required
                .iter()
                .map(|f| f.path())
                .collect::<Vec<_>>()
        );
    }

    Ok(NormalizedSheet {
        header_row,
        columns,
        rows: raw_rows,
        records,
        validation,
    })
}

fn column_reports(ctx: &HeaderContext, mapping: &ColumnMapping) -> Vec<ColumnReport> {
    mapping
        .iter()
        .enumerate()
        .map(|(col, target)| ColumnReport {
            column: column_letter(col),
            headers: ctx.texts(col).into_iter().map(str::to_string).collect(),
            target: *target,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::fields::CanonicalField as F;
    use crate::sheet_parser::CellValue;

    fn row(cells: &[&str]) -> Vec<CellValue> {
        cells
            .iter()
            .map(|c| {
                if c.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::text(*c)
                }
            })
            .collect()
    }

    const HEADER: [&str; 8] = [
        "DATE OF APPREHENSION",
        "AGENCY",
        "CASE NUMBER",
        "VIOLATION",
        "DRIVER/OPERATOR",
        "",
        "PLATE NO.",
        "PLACE OF APPREHENSION",
    ];

    #[test]
    fn test_single_record_scenario() {
        // The continuation row under the header is consumed as header context
        let sheet = RawSheet::from_rows(
            "Sheet1",
            vec![
                row(&HEADER),
                row(&[]),
                row(&[
                    "2025-03-01",
                    "PNP",
                    "CASE-001",
                    "Illegal Parking",
                    "Dela Cruz",
                    "Juan",
                    "ABC1234",
                    "EDSA",
                ]),
            ],
        );

        let result = normalize(&sheet, &HeaderTable::builtin()).unwrap();
        assert_eq!(result.records.len(), 1);
        let input = &result.records[0];
        assert_eq!(input.case_number, "CASE-001");
        assert_eq!(input.driver.last_name, "Dela Cruz");
        assert_eq!(input.driver.first_name, "Juan");
        assert_eq!(input.plate_number, "ABC1234");
        assert_eq!(input.date_of_apprehension, "2025-03-01");
        assert_eq!(input.place_of_apprehension, "EDSA");
        assert!(result.validation.missing_required.is_empty());
        assert_eq!(result.rows[0].sheet_row, 3);
    }

    #[test]
    fn test_single_header_row_loses_first_data_row() {
        let sheet = RawSheet::from_rows(
            "Sheet1",
            vec![
                row(&HEADER),
                row(&["2025-03-01", "PNP", "CASE-001", "X", "A", "B", "P1", "EDSA"]),
                row(&["2025-03-02", "MMDA", "CASE-002", "Y", "C", "D", "P2", "Cubao"]),
            ],
        );
        let result = normalize(&sheet, &HeaderTable::builtin()).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].case_number, "CASE-002");
    }

    #[test]
    fn test_title_and_header_without_data() {
        let sheet = RawSheet::from_rows(
            "Sheet1",
            vec![row(&["Apprehension Report"]), row(&HEADER)],
        );
        let err = normalize(&sheet, &HeaderTable::builtin()).unwrap_err();
        assert!(matches!(err, ImportError::NoDataRows));
    }

    #[test]
    fn test_too_few_rows() {
        let sheet = RawSheet::from_rows("Sheet1", vec![row(&HEADER)]);
        assert!(matches!(
            normalize(&sheet, &HeaderTable::builtin()),
            Err(ImportError::NoDataRows)
        ));
        let empty = RawSheet::from_rows("Sheet1", vec![]);
        assert!(matches!(
            normalize(&empty, &HeaderTable::builtin()),
            Err(ImportError::NoDataRows)
        ));
    }

    #[test]
    fn test_unknown_column_is_advisory() {
        let mut header = HEADER.to_vec();
        header.push("Badge Color");
        let sheet = RawSheet::from_rows(
            "Sheet1",
            vec![
                row(&header),
                row(&[]),
                row(&["2025-03-01", "PNP", "C-1", "X", "A", "B", "P1", "EDSA", "red"]),
            ],
        );
        let result = normalize(&sheet, &HeaderTable::builtin()).unwrap();
        assert_eq!(result.validation.unmapped_count, 1);
        assert!(result.validation.can_import());
        assert_eq!(result.columns[8].column, "I");
        assert_eq!(result.columns[8].target, ColumnTarget::Unknown);
        assert_eq!(result.columns[8].headers, vec!["Badge Color"]);
    }

    #[test]
    fn test_record_count_matches_non_blank_rows() {
        let mut rows = vec![row(&["LTO"]), row(&HEADER), row(&["", "", "", "", "Last Name", "First Name"])];
        for i in 0..5 {
            rows.push(row(&["2025-03-01", "PNP", format!("C-{i}").as_str(), "X", "A", "B", "P", "EDSA"]));
            rows.push(row(&[]));
        }
        let sheet = RawSheet::from_rows("Sheet1", rows);
        let result = normalize(&sheet, &HeaderTable::builtin()).unwrap();
        assert_eq!(result.header_row, 1);
        assert_eq!(result.records.len(), 5);
        assert_eq!(result.columns[4].target, ColumnTarget::Field(F::DriverLastName));
        assert_eq!(result.columns[5].target, ColumnTarget::Field(F::DriverFirstName));
    }

    #[test]
    fn test_missing_required_still_normalizes() {
        let sheet = RawSheet::from_rows(
            "Sheet1",
            vec![
                row(&["AGENCY", "VIOLATION", "REMARKS"]),
                row(&[]),
                row(&["PNP", "Speeding", "none"]),
            ],
        );
        let result = normalize(&sheet, &HeaderTable::builtin()).unwrap();
        assert_eq!(
            result.validation.missing_required,
            vec![
                F::DateOfApprehension,
                F::CaseNumber,
                F::PlateNumber,
                F::PlaceOfApprehension
            ]
        );
    }
}
