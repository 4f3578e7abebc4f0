//! Mapping validation.

use serde::Serialize;
use std::collections::HashSet;

use super::fields::{CanonicalField, ColumnMapping, ColumnTarget, REQUIRED_FIELDS};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Required fields no column maps to, in required-list order.
    pub missing_required: Vec<CanonicalField>,
    /// Columns whose header matched nothing.
    pub unmapped_count: usize,
}

impl ValidationResult {
    /// Submission is allowed only when every required field has a column.
    pub fn can_import(&self) -> bool {
        self.missing_required.is_empty()
    }
}

/// Check a mapping for required fields and unrecognized columns.
pub fn validate_fields(mapping: &ColumnMapping) -> ValidationResult {
    let mapped: HashSet<CanonicalField> = mapping.iter().filter_map(ColumnTarget::field).collect();

    ValidationResult {
        missing_required: REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|f| !mapped.contains(f))
            .collect(),
        unmapped_count: mapping
            .iter()
            .filter(|t| **t == ColumnTarget::Unknown)
            .count(),
    }
}
