//! Canonical target fields a spreadsheet column can map to.

use serde::{Serialize, Serializer};
use std::fmt;

/// Closed set of dotted field paths of the apprehension record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    DateOfSubmission,
    DateOfApprehension,
    TimeOfApprehension,
    Agency,
    ApprehendingOfficer,
    CaseNumber,
    DriverLastName,
    DriverFirstName,
    Violation,
    ConfiscatedItemType,
    ConfiscatedItemNumber,
    RestrictionCode,
    Conditions,
    Nationality,
    Gender,
    MvType,
    PlateNumber,
    PlaceOfApprehension,
    Remarks,
}

/// Fields whose absence from the mapping blocks submission.
pub const REQUIRED_FIELDS: [CanonicalField; 6] = [
    CanonicalField::DateOfApprehension,
    CanonicalField::Agency,
    CanonicalField::CaseNumber,
    CanonicalField::Violation,
    CanonicalField::PlateNumber,
    CanonicalField::PlaceOfApprehension,
];

impl CanonicalField {
    pub const ALL: [CanonicalField; 19] = [
        Self::DateOfSubmission,
        Self::DateOfApprehension,
        Self::TimeOfApprehension,
        Self::Agency,
        Self::ApprehendingOfficer,
        Self::CaseNumber,
        Self::DriverLastName,
        Self::DriverFirstName,
        Self::Violation,
        Self::ConfiscatedItemType,
        Self::ConfiscatedItemNumber,
        Self::RestrictionCode,
        Self::Conditions,
        Self::Nationality,
        Self::Gender,
        Self::MvType,
        Self::PlateNumber,
        Self::PlaceOfApprehension,
        Self::Remarks,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Self::DateOfSubmission => "dateOfSubmission",
            Self::DateOfApprehension => "dateOfApprehension",
            Self::TimeOfApprehension => "timeOfApprehension",
            Self::Agency => "agency",
            Self::ApprehendingOfficer => "apprehendingOfficer",
            Self::CaseNumber => "caseNumber",
            Self::DriverLastName => "driver.lastName",
            Self::DriverFirstName => "driver.firstName",
            Self::Violation => "violation",
            Self::ConfiscatedItemType => "confiscatedItem.type",
            Self::ConfiscatedItemNumber => "confiscatedItem.number",
            Self::RestrictionCode => "restrictionCode",
            Self::Conditions => "conditions",
            Self::Nationality => "nationality",
            Self::Gender => "gender",
            Self::MvType => "mvType",
            Self::PlateNumber => "plateNumber",
            Self::PlaceOfApprehension => "placeOfApprehension",
            Self::Remarks => "remarks",
        }
    }

    /// Look up a field by its dotted path (exact, case-sensitive).
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.path() == path)
    }

    pub fn is_required(&self) -> bool {
        REQUIRED_FIELDS.contains(self)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Self::DateOfSubmission | Self::DateOfApprehension)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl Serialize for CanonicalField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.path())
    }
}

/// Outcome of mapping one spreadsheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnTarget {
    Field(CanonicalField),
    /// Column intentionally ignored (blank header, computed field, closed group).
    Skip,
    /// Header text matched nothing.
    Unknown,
}

impl ColumnTarget {
    pub fn field(&self) -> Option<CanonicalField> {
        match self {
            Self::Field(f) => Some(*f),
            Self::Skip | Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field(f) => f.path(),
            Self::Skip => "_skip_",
            Self::Unknown => "_unknown_",
        }
    }
}

impl From<CanonicalField> for ColumnTarget {
    fn from(field: CanonicalField) -> Self {
        Self::Field(field)
    }
}

impl fmt::Display for ColumnTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ColumnTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One target per spreadsheet column, left to right.
pub type ColumnMapping = Vec<ColumnTarget>;
