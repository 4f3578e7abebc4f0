//! Header row location.
//!
//! Exports often carry title/report rows above the real header. The header
//! is the first row, within a short window, that has at least three filled
//! cells.

use crate::sheet_parser::{CellValue, RawSheet};

/// Rows scanned when looking for the header (rows 0..=4).
const HEADER_SCAN_ROWS: usize = 5;
/// Minimum non-blank cells for a row to count as a header.
const MIN_HEADER_CELLS: usize = 3;

/// Trimmed header text of the header row and the row below it.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderContext {
    pub header_row: usize,
    /// Top to bottom; one or two rows.
    pub rows: Vec<Vec<String>>,
    /// First data row index. Always `header_row + 2`, capped at the sheet length.
    pub data_start: usize,
}

impl HeaderContext {
    /// Number of columns: the longest header-context row.
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Non-empty header texts of one column, top to bottom.
    pub fn texts(&self, col: usize) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|r| r.get(col))
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Index of the row most likely holding column headers. Defaults to 0.
pub fn locate_header_row(sheet: &RawSheet) -> usize {
    let window = HEADER_SCAN_ROWS.min(sheet.rows.len());
    sheet.rows[..window]
        .iter()
        .position(|row| row.iter().filter(|c| c.is_filled()).count() >= MIN_HEADER_CELLS)
        .unwrap_or(0)
}

/// Collect the header row and its continuation row.
///
/// The continuation row is consumed even when it holds data; a sheet with
/// a single header row therefore loses its first data row.
pub fn header_context(sheet: &RawSheet, header_row: usize) -> HeaderContext {
    let last = sheet.rows.len().saturating_sub(1);
    let end = (header_row + 1).min(last);

    let rows: Vec<Vec<String>> = (header_row..=end)
        .filter_map(|i| sheet.rows.get(i))
        .map(|row| row.iter().map(header_text).collect())
        .collect();

    HeaderContext {
        header_row,
        data_start: header_row + rows.len(),
        rows,
    }
}

fn header_text(cell: &CellValue) -> String {
    cell.display().trim().to_string()
}
