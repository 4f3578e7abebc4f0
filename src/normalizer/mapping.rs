//! Header text → canonical field mapping.
//!
//! Each column's header texts are tried bottom row first against an ordered
//! matcher chain: grouped headers, direct keys, substring patterns, then
//! single words. Grouped headers ("DRIVER/OPERATOR") span two columns; only
//! the left cell of a merge carries text, so the following textless column
//! takes the group's second field.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::fields::{CanonicalField, ColumnMapping, ColumnTarget};
use super::header::HeaderContext;

use super::fields::CanonicalField as F;

/// Headers spanning two columns: (key, first column field, second column field).
const GROUPED_HEADERS: [(&str, CanonicalField, CanonicalField); 3] = [
    ("driveroperator", F::DriverLastName, F::DriverFirstName),
    ("driver", F::DriverLastName, F::DriverFirstName),
    ("confiscateditem", F::ConfiscatedItemType, F::ConfiscatedItemNumber),
];

const DIRECT_HEADERS: [(&str, CanonicalField); 20] = [
    ("dateofsubmission", F::DateOfSubmission),
    ("dateofapprehension", F::DateOfApprehension),
    ("timeofapprehension", F::TimeOfApprehension),
    ("agency", F::Agency),
    ("apprehendingofficer", F::ApprehendingOfficer),
    ("casenumber", F::CaseNumber),
    ("toptransactioncasenumber", F::CaseNumber),
    ("violation", F::Violation),
    ("mvtype", F::MvType),
    ("platenumber", F::PlateNumber),
    ("plateno", F::PlateNumber),
    ("platenomvfileno", F::PlateNumber),
    ("placeofapprehension", F::PlaceOfApprehension),
    ("remarks", F::Remarks),
    ("lastname", F::DriverLastName),
    ("firstname", F::DriverFirstName),
    ("restrictioncode", F::RestrictionCode),
    ("conditions", F::Conditions),
    ("nationality", F::Nationality),
    ("gender", F::Gender),
];

/// Substring patterns, first match in table order wins.
const HEADER_PATTERNS: [(&str, ColumnTarget); 14] = [
    ("dateofsubmission", ColumnTarget::Field(F::DateOfSubmission)),
    ("dateofapprehension", ColumnTarget::Field(F::DateOfApprehension)),
    ("timeofapprehension", ColumnTarget::Field(F::TimeOfApprehension)),
    ("apprehendingofficer", ColumnTarget::Field(F::ApprehendingOfficer)),
    ("casenumber", ColumnTarget::Field(F::CaseNumber)),
    ("transactioncasenumber", ColumnTarget::Field(F::CaseNumber)),
    ("placeofapprehension", ColumnTarget::Field(F::PlaceOfApprehension)),
    ("platenomvfile", ColumnTarget::Field(F::PlateNumber)),
    ("platenofile", ColumnTarget::Field(F::PlateNumber)),
    ("platenumber", ColumnTarget::Field(F::PlateNumber)),
    ("plateno", ColumnTarget::Field(F::PlateNumber)),
    ("mvtype", ColumnTarget::Field(F::MvType)),
    ("daysinterval", ColumnTarget::Skip),
    ("restrictioncode", ColumnTarget::Field(F::RestrictionCode)),
];

const SINGLE_WORDS: [(&str, CanonicalField); 6] = [
    ("agency", F::Agency),
    ("violation", F::Violation),
    ("remarks", F::Remarks),
    ("gender", F::Gender),
    ("nationality", F::Nationality),
    ("conditions", F::Conditions),
];

/// Computed server-side; never imported.
const DAYS_INTERVAL_KEY: &str = "daysinterval";

/// Lowercase, then drop everything outside `[a-z0-9]`.
pub fn normalize_key(raw: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new("[^a-z0-9]").expect("static pattern"));
    re.replace_all(&raw.to_lowercase(), "").into_owned()
}

/// Spreadsheet column letter for a 0-based index (0 → A, 26 → AA).
pub fn column_letter(mut idx: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (idx % 26) as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Lookup tables used by the matcher chain.
#[derive(Debug, Clone)]
pub struct HeaderTable {
    grouped: Vec<(String, CanonicalField, CanonicalField)>,
    direct: HashMap<String, ColumnTarget>,
    patterns: Vec<(String, ColumnTarget)>,
    single_words: Vec<(String, CanonicalField)>,
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HeaderTable {
    pub fn builtin() -> Self {
        let mut direct: HashMap<String, ColumnTarget> = DIRECT_HEADERS
            .iter()
            .map(|(k, f)| (k.to_string(), ColumnTarget::Field(*f)))
            .collect();
        direct.insert(DAYS_INTERVAL_KEY.to_string(), ColumnTarget::Skip);

        Self {
            grouped: GROUPED_HEADERS
                .iter()
                .map(|(k, a, b)| (k.to_string(), *a, *b))
                .collect(),
            direct,
            patterns: HEADER_PATTERNS
                .iter()
                .map(|(k, t)| (k.to_string(), *t))
                .collect(),
            single_words: SINGLE_WORDS
                .iter()
                .map(|(k, f)| (k.to_string(), *f))
                .collect(),
        }
    }

    /// Add direct aliases. Existing keys are never replaced.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = (S, CanonicalField)>,
        S: AsRef<str>,
    {
        for (raw, field) in aliases {
            let key = normalize_key(raw.as_ref());
            if key.is_empty() {
                warn!("Ignoring header alias '{}': no alphanumeric characters", raw.as_ref());
                continue;
            }
            if self.direct.contains_key(&key) || self.grouped.iter().any(|(k, _, _)| *k == key) {
                warn!("Ignoring header alias '{}': key '{}' already mapped", raw.as_ref(), key);
                continue;
            }
            debug!("Header alias '{}' -> {}", key, field);
            self.direct.insert(key, ColumnTarget::Field(field));
        }
        self
    }

    /// Map one column given its header texts (top to bottom).
    ///
    /// `cursor` carries group state from the column to the left.
    pub fn map_column(&self, cursor: &mut GroupCursor, texts: &[&str]) -> ColumnTarget {
        if texts.is_empty() {
            return match cursor.open.take() {
                Some(group) => self.group_slot(cursor, group),
                None => ColumnTarget::Skip,
            };
        }

        // A visible header always starts fresh
        cursor.open = None;

        let keys: Vec<String> = texts.iter().map(|t| normalize_key(t)).collect();
        if keys.iter().any(|k| k.contains(DAYS_INTERVAL_KEY)) {
            return ColumnTarget::Skip;
        }

        for key in keys.iter().rev() {
            let found = MATCHERS.iter().find_map(|matcher| matcher(self, key));
            match found {
                Some(HeaderMatch::Group(group)) => {
                    let target = self.group_slot(cursor, group);
                    cursor.open = Some(group);
                    return target;
                }
                Some(HeaderMatch::Target(target)) => return target,
                None => continue,
            }
        }

        ColumnTarget::Unknown
    }

    /// Take the next slot of a group; groups yield two fields, then skip.
    fn group_slot(&self, cursor: &mut GroupCursor, group: usize) -> ColumnTarget {
        let used = cursor.used.entry(group).or_insert(0);
        let (_, first, second) = &self.grouped[group];
        let target = match *used {
            0 => ColumnTarget::Field(*first),
            1 => ColumnTarget::Field(*second),
            _ => ColumnTarget::Skip,
        };
        *used += 1;
        target
    }
}

/// Group state threaded through the left-to-right column walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupCursor {
    /// Group opened by the column immediately to the left.
    open: Option<usize>,
    /// Slots consumed per group across the sheet.
    used: HashMap<usize, usize>,
}

impl GroupCursor {
    pub fn has_open_group(&self) -> bool {
        self.open.is_some()
    }
}

enum HeaderMatch {
    Group(usize),
    Target(ColumnTarget),
}

type Matcher = fn(&HeaderTable, &str) -> Option<HeaderMatch>;

const MATCHERS: [Matcher; 4] = [match_grouped, match_direct, match_pattern, match_single_word];

fn match_grouped(table: &HeaderTable, key: &str) -> Option<HeaderMatch> {
    table
        .grouped
        .iter()
        .position(|(k, _, _)| k == key)
        .map(HeaderMatch::Group)
}

fn match_direct(table: &HeaderTable, key: &str) -> Option<HeaderMatch> {
    table.direct.get(key).copied().map(HeaderMatch::Target)
}

fn match_pattern(table: &HeaderTable, key: &str) -> Option<HeaderMatch> {
    table
        .patterns
        .iter()
        .find(|(pattern, _)| key.contains(pattern.as_str()))
        .map(|(_, target)| HeaderMatch::Target(*target))
}

fn match_single_word(table: &HeaderTable, key: &str) -> Option<HeaderMatch> {
    table
        .single_words
        .iter()
        .find(|(word, _)| word == key)
        .map(|(_, field)| HeaderMatch::Target(ColumnTarget::Field(*field)))
}

/// Build the column mapping for a located header.
pub fn map_headers(ctx: &HeaderContext, table: &HeaderTable) -> ColumnMapping {
    let mut cursor = GroupCursor::default();
    let mapping: ColumnMapping = (0..ctx.column_count())
        .map(|col| {
            let texts = ctx.texts(col);
            let target = table.map_column(&mut cursor, &texts);
            debug!("Column {} {:?} -> {}", column_letter(col), texts, target);
            target
        })
        .collect();
    if cursor.has_open_group() {
        warn!("Grouped header in the last column has no second column");
    }
    mapping
}
