//! Raw cell → typed record coercion.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};

use super::fields::CanonicalField as F;
use super::rows::RawRecord;
use crate::apprehension::{ApprehensionInput, ConfiscatedItem, Driver};
use crate::sheet_parser::CellValue;

/// Date-only layouts tried in order after RFC 3339.
const DATE_FORMATS: [&str; 12] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%m/%d/%y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A, %B %d, %Y",
];

/// Date-time layouts without offset; the date part is taken as is.
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Normalize a date cell to `YYYY-MM-DD`, or pass the text through.
///
/// Numbers (and numeric text) are spreadsheet date serials. Unparseable
/// text is returned trimmed, never rejected.
pub fn format_date(value: &CellValue) -> String {
    match value {
        CellValue::Empty | CellValue::Bool(false) => String::new(),
        CellValue::Text(s) if s.is_empty() => String::new(),
        CellValue::Number(n) if *n == 0.0 => String::new(),
        CellValue::Number(n) => excel_serial_to_date(*n).unwrap_or_else(|| value.display()),
        CellValue::Text(_) | CellValue::Bool(true) => {
            let text = value.display().trim().to_string();
            if let Ok(serial) = text.parse::<f64>() {
                if serial == 0.0 {
                    return String::new();
                }
                if serial.is_finite() {
                    return excel_serial_to_date(serial).unwrap_or(text);
                }
            }
            parse_date_text(&text)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or(text)
        }
    }
}

/// Convert a 1900-system date serial to `YYYY-MM-DD`.
///
/// Serial 60 is the nonexistent 1900-02-29 kept by the 1900 leap-year bug;
/// it is rendered literally. Negative serials have no date.
pub fn excel_serial_to_date(serial: f64) -> Option<String> {
    if serial < 0.0 || !serial.is_finite() {
        return None;
    }

    let mut days = serial.trunc() as u64;
    // Times within a rounding step of midnight belong to the next day
    if ((serial - serial.trunc()) * 86400.0).round() >= 86400.0 {
        days += 1;
    }

    match days {
        0 => Some("1900-01-00".to_string()),
        60 => Some("1900-02-29".to_string()),
        1..=59 => NaiveDate::from_ymd_opt(1899, 12, 31)?
            .checked_add_days(Days::new(days))
            .map(|d| d.format("%Y-%m-%d").to_string()),
        _ => NaiveDate::from_ymd_opt(1899, 12, 30)?
            .checked_add_days(Days::new(days))
            .map(|d| d.format("%Y-%m-%d").to_string()),
    }
}

/// Generic date parsing. Offsets are honored by converting to UTC.
fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })
}

/// Stringify and trim; null becomes empty.
fn text(value: &CellValue) -> String {
    value.display().trim().to_string()
}

/// Build the submission record from one extracted row.
pub fn to_input(record: &RawRecord) -> ApprehensionInput {
    let get = |field| record.get(field);

    ApprehensionInput {
        date_of_submission: format_date(get(F::DateOfSubmission)),
        date_of_apprehension: format_date(get(F::DateOfApprehension)),
        time_of_apprehension: text(get(F::TimeOfApprehension)),
        agency: text(get(F::Agency)),
        apprehending_officer: text(get(F::ApprehendingOfficer)),
        case_number: text(get(F::CaseNumber)),
        driver: Driver {
            last_name: text(get(F::DriverLastName)),
            first_name: text(get(F::DriverFirstName)),
        },
        violation: text(get(F::Violation)),
        confiscated_item: ConfiscatedItem {
            item_type: Some(text(get(F::ConfiscatedItemType))),
            number: Some(text(get(F::ConfiscatedItemNumber))),
        },
        restriction_code: text(get(F::RestrictionCode)),
        conditions: text(get(F::Conditions)),
        nationality: text(get(F::Nationality)),
        gender: text(get(F::Gender)),
        mv_type: text(get(F::MvType)),
        plate_number: text(get(F::PlateNumber)),
        place_of_apprehension: text(get(F::PlaceOfApprehension)),
        remarks: text(get(F::Remarks)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_serial_and_iso_agree() {
        // 2025-03-01 is serial 45717
        assert_eq!(format_date(&CellValue::Number(45717.0)), "2025-03-01");
        assert_eq!(format_date(&CellValue::text("2025-03-01")), "2025-03-01");
        // Time of day does not move the date
        assert_eq!(format_date(&CellValue::Number(45717.75)), "2025-03-01");
    }

    #[test]
    fn test_serial_edges() {
        assert_eq!(excel_serial_to_date(1.0).as_deref(), Some("1900-01-01"));
        assert_eq!(excel_serial_to_date(59.0).as_deref(), Some("1900-02-28"));
        assert_eq!(excel_serial_to_date(60.0).as_deref(), Some("1900-02-29"));
        assert_eq!(excel_serial_to_date(61.0).as_deref(), Some("1900-03-01"));
        assert_eq!(excel_serial_to_date(36526.0).as_deref(), Some("2000-01-01"));
        assert_eq!(excel_serial_to_date(45716.99999999).as_deref(), Some("2025-03-01"));
        assert_eq!(excel_serial_to_date(-3.0), None);
    }

    #[test]
    fn test_numeric_text_is_serial() {
        assert_eq!(format_date(&CellValue::text(" 45717 ")), "2025-03-01");
    }

    #[test]
    fn test_empty_dates() {
        assert_eq!(format_date(&CellValue::Empty), "");
        assert_eq!(format_date(&CellValue::text("")), "");
        assert_eq!(format_date(&CellValue::Number(0.0)), "");
        // Zero as text reads the same as the numeric cell
        assert_eq!(format_date(&CellValue::text("0")), "");
        assert_eq!(format_date(&CellValue::text(" 0.0 ")), "");
    }

    #[test]
    fn test_common_text_layouts() {
        assert_eq!(format_date(&CellValue::text("03/01/2025")), "2025-03-01");
        assert_eq!(format_date(&CellValue::text("March 1, 2025")), "2025-03-01");
        assert_eq!(format_date(&CellValue::text("Mar 1, 2025")), "2025-03-01");
        assert_eq!(format_date(&CellValue::text("2025/03/01")), "2025-03-01");
        assert_eq!(format_date(&CellValue::text("2025-03-01T10:30:00")), "2025-03-01");
        assert_eq!(
            format_date(&CellValue::text("2025-03-01T06:00:00+08:00")),
            "2025-02-28"
        );
    }

    #[test]
    fn test_unparseable_date_passes_through() {
        assert_eq!(format_date(&CellValue::text("  sometime in March ")), "sometime in March");
        assert_eq!(format_date(&CellValue::text("31/12/2025")), "31/12/2025");
        assert_eq!(format_date(&CellValue::Number(-5.0)), "-5");
    }

    #[test]
    fn test_to_input_trims_and_fills_defaults() {
        let mut values = BTreeMap::new();
        values.insert(F::CaseNumber, CellValue::text("  CASE-001 "));
        values.insert(F::DriverLastName, CellValue::text("Dela Cruz"));
        values.insert(F::ConfiscatedItemNumber, CellValue::Number(12345.0));
        values.insert(F::Remarks, CellValue::Empty);
        values.insert(F::DateOfApprehension, CellValue::Number(45717.0));
        let record = RawRecord { sheet_row: 3, values };

        let input = to_input(&record);
        assert_eq!(input.case_number, "CASE-001");
        assert_eq!(input.driver.last_name, "Dela Cruz");
        assert_eq!(input.driver.first_name, "");
        assert_eq!(input.confiscated_item.number.as_deref(), Some("12345"));
        assert_eq!(input.confiscated_item.item_type.as_deref(), Some(""));
        assert_eq!(input.remarks, "");
        assert_eq!(input.date_of_apprehension, "2025-03-01");
        assert_eq!(input.date_of_submission, "");
    }
}
