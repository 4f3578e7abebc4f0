//! Data row extraction.

use serde::Serialize;
use std::collections::BTreeMap;

use super::fields::{CanonicalField, ColumnMapping};
use crate::sheet_parser::{CellValue, RawSheet};

/// One non-blank data row projected onto canonical fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRecord {
    /// 1-based row number in the worksheet.
    pub sheet_row: usize,
    /// `Empty` stands for a null or missing cell.
    pub values: BTreeMap<CanonicalField, CellValue>,
}

impl RawRecord {
    pub fn get(&self, field: CanonicalField) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.values.get(&field).unwrap_or(&EMPTY)
    }
}

/// Walk rows from `data_start`, skipping rows whose cells are all blank.
///
/// When two columns map to the same field, the rightmost one wins.
pub fn extract_rows(sheet: &RawSheet, mapping: &ColumnMapping, data_start: usize) -> Vec<RawRecord> {
    sheet
        .rows
        .iter()
        .enumerate()
        .skip(data_start)
        .filter(|(_, row)| !row.iter().all(CellValue::is_blank))
        .map(|(idx, _)| {
            let values = mapping
                .iter()
                .enumerate()
                .filter_map(|(col, target)| {
                    let field = target.field()?;
                    Some((field, sheet.cell(idx, col).clone()))
                })
                .collect();
            RawRecord {
                sheet_row: idx + 1,
                values,
            }
        })
        .collect()
}
