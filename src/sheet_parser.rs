//! Workbook reading for CSV and Excel-family files (.xlsx/.xlsm/.xlsb/.xls/.ods).
//!
//! Only the first worksheet is read. Rows are kept raw (no header
//! interpretation); locating the header is the normalizer's job.

use crate::error::ImportError;
use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_from_rs, Data, Ods, Reader, Xls, Xlsb, Xlsx};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;

/// Source type of the parsed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Csv,
    Excel,
}

/// A raw cell value as read from the worksheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    /// Plain numbers and date serials alike.
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Absent or empty string. Whitespace-only text is not blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }

    /// Has visible content once trimmed.
    pub fn is_filled(&self) -> bool {
        match self {
            Self::Empty => false,
            Self::Text(s) => !s.trim().is_empty(),
            Self::Number(_) | Self::Bool(_) => true,
        }
    }

    /// String form of the cell, untrimmed.
    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => {
                // Avoid trailing ".0" for whole numbers
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(cell: &Data) -> Self {
        match cell {
            Data::Empty => Self::Empty,
            Data::String(s) => Self::Text(s.clone()),
            Data::Int(i) => Self::Number(*i as f64),
            Data::Float(f) => Self::Number(*f),
            Data::Bool(b) => Self::Bool(*b),
            // Keep the serial; date coercion happens per target field
            Data::DateTime(dt) => Self::Number(dt.as_f64()),
            Data::DateTimeIso(s) => Self::Text(s.clone()),
            Data::DurationIso(s) => Self::Text(s.clone()),
            Data::Error(e) => Self::Text(e.to_string()),
        }
    }
}

/// First worksheet of an uploaded file as a row-major grid.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
    pub source_type: SourceType,
}

impl RawSheet {
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
            source_type: SourceType::Excel,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell at (row, col); missing cells read as `Empty`.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// Dispatch file parsing by extension.
pub fn parse_file(filename: &str, data: &[u8]) -> Result<RawSheet, ImportError> {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    let parsed = match ext.as_str() {
        "csv" => parse_csv(filename, data),
        "xlsx" | "xlsm" => open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(data))
            .context("Failed to open Excel workbook")
            .and_then(read_first_sheet),
        "xlsb" => open_workbook_from_rs::<Xlsb<_>, _>(Cursor::new(data))
            .context("Failed to open Excel workbook")
            .and_then(read_first_sheet),
        "xls" => open_workbook_from_rs::<Xls<_>, _>(Cursor::new(data))
            .context("Failed to open Excel workbook")
            .and_then(read_first_sheet),
        "ods" => open_workbook_from_rs::<Ods<_>, _>(Cursor::new(data))
            .context("Failed to open OpenDocument spreadsheet")
            .and_then(read_first_sheet),
        _ => return Err(ImportError::UnsupportedFile(ext)),
    };

    let sheet = parsed.map_err(ImportError::Unreadable)?;
    tracing::info!(
        "Read sheet '{}' from {} ({} rows)",
        sheet.name,
        filename,
        sheet.rows.len()
    );
    Ok(sheet)
}

/// Parse a CSV file into a single RawSheet. No row is treated as header here.
fn parse_csv(filename: &str, data: &[u8]) -> Result<RawSheet> {
    let text = decode_csv(data);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        let row: Vec<CellValue> = record
            .iter()
            .map(|f| {
                if f.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::text(f)
                }
            })
            .collect();
        rows.push(row);
    }

    let name = filename
        .rsplit('/')
        .next()
        .unwrap_or(filename)
        .rsplit('\\')
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv")
        .to_string();

    Ok(RawSheet {
        name,
        rows,
        source_type: SourceType::Csv,
    })
}

/// CSV bytes as text. Excel's "Save as CSV" writes the ANSI code page, so
/// anything that is not UTF-8 is read as Windows-1252.
fn decode_csv(data: &[u8]) -> Cow<'_, str> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    match std::str::from_utf8(data) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            tracing::debug!("CSV is not valid UTF-8, decoding as Windows-1252");
            encoding_rs::WINDOWS_1252.decode_without_bom_handling(data).0
        }
    }
}

/// Read the first worksheet of an opened workbook.
fn read_first_sheet<'a, R>(mut workbook: R) -> Result<RawSheet>
where
    R: Reader<Cursor<&'a [u8]>>,
    R::Error: fmt::Display,
{
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("Workbook has no worksheets"))?;

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| anyhow!("Failed to read sheet '{}': {}", name, e))?;

    Ok(range_to_raw_sheet(&name, &range))
}

/// Convert a calamine Range into a RawSheet, keeping every row.
fn range_to_raw_sheet(name: &str, range: &calamine::Range<Data>) -> RawSheet {
    let rows = range
        .rows()
        .map(|row| row.iter().map(CellValue::from).collect())
        .collect();

    RawSheet::from_rows(name, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_keeps_title_rows() {
        let csv_data = b"LTO Report,,\nDATE,AGENCY,CASE NUMBER\n2025-03-01,PNP,CASE-001\n";
        let sheet = parse_file("report.csv", csv_data).unwrap();
        assert_eq!(sheet.source_type, SourceType::Csv);
        assert_eq!(sheet.name, "report");
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[0][0], CellValue::text("LTO Report"));
        assert_eq!(sheet.rows[0][1], CellValue::Empty);
        assert_eq!(sheet.rows[2][2], CellValue::text("CASE-001"));
    }

    #[test]
    fn test_parse_csv_flexible() {
        // Rows with different column counts should still parse
        let csv_data = b"a,b,c\n1,2,3\n4,5\n";
        let sheet = parse_file("flex.csv", csv_data).unwrap();
        assert_eq!(sheet.rows[2].len(), 2);
        assert_eq!(sheet.cell(2, 2), &CellValue::Empty);
    }

    #[test]
    fn test_parse_csv_windows_1252() {
        let csv_data = b"DATE,AGENCY,DRIVER\n2025-03-01,PNP,Dela Pe\xF1a\n2025-03-02,MMDA,O\x92Neil\n";
        let sheet = parse_file("lto.csv", csv_data).unwrap();
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[1][2], CellValue::text("Dela Pe\u{f1}a"));
        assert_eq!(sheet.rows[2][2], CellValue::text("O\u{2019}Neil"));
    }

    #[test]
    fn test_parse_csv_utf8_bom() {
        let csv_data = "\u{feff}DATE,AGENCY\n2025-03-01,Pe\u{f1}a\n".as_bytes();
        let sheet = parse_file("bom.csv", csv_data).unwrap();
        assert_eq!(sheet.rows[0][0], CellValue::text("DATE"));
        assert_eq!(sheet.rows[1][1], CellValue::text("Pe\u{f1}a"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = parse_file("test.txt", b"data").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFile(ref ext) if ext == "txt"));
    }

    #[test]
    fn test_garbage_workbook_is_unreadable() {
        let err = parse_file("broken.xlsx", b"not a zip archive").unwrap_err();
        assert!(matches!(err, ImportError::Unreadable(_)));
        assert!(err.is_parse_failure());
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Number(45717.0).display(), "45717");
        assert_eq!(CellValue::Number(1.5).display(), "1.5");
        assert_eq!(CellValue::Bool(true).display(), "true");
        assert_eq!(CellValue::Empty.display(), "");
    }

    #[test]
    fn test_blank_vs_filled() {
        assert!(CellValue::Empty.is_blank());
        assert!(CellValue::text("").is_blank());
        assert!(!CellValue::text("  ").is_blank());
        assert!(!CellValue::text("  ").is_filled());
        assert!(CellValue::Number(0.0).is_filled());
    }

    #[test]
    fn test_calamine_cells_convert() {
        assert_eq!(CellValue::from(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(
            CellValue::from(&Data::String("PNP".to_string())),
            CellValue::text("PNP")
        );
        assert_eq!(CellValue::from(&Data::Empty), CellValue::Empty);
    }
}
