//! License family classification.

use serde::{Deserialize, Serialize};

/// Coarse license category used to bucket matches and drive severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub enum LicenseFamily {
    /// Copyleft licenses (GPL, LGPL, MPL, ...)
    Reciprocal,
    /// License could not be determined
    Unknown,
    /// Permissive licenses (MIT, BSD, Apache, ...)
    Permissive,
    /// Anything the matching service reports that fits none of the above
    Other,
}

impl LicenseFamily {
    /// Classify a raw family string reported by the matching service.
    ///
    /// Matching is by substring on the upper-cased value, checked in the
    /// order RECIPROCAL, UNKNOWN, PERMISSIVE. A family such as
    /// `"NOT_RECIPROCAL_AT_ALL"` therefore classifies as `Reciprocal`.
    pub fn classify(raw: &str) -> Self {
        let upper = raw.to_uppercase();
        if upper.contains("RECIPROCAL") {
            LicenseFamily::Reciprocal
        } else if upper.contains("UNKNOWN") {
            LicenseFamily::Unknown
        } else if upper.contains("PERMISSIVE") {
            LicenseFamily::Permissive
        } else {
            LicenseFamily::Other
        }
    }

    /// Whether matches in this family need a reviewer's attention.
    pub fn requires_action(self) -> bool {
        matches!(self, LicenseFamily::Reciprocal | LicenseFamily::Unknown)
    }
}

impl std::fmt::Display for LicenseFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LicenseFamily::Reciprocal => write!(f, "RECIPROCAL"),
            LicenseFamily::Unknown => write!(f, "UNKNOWN"),
            LicenseFamily::Permissive => write!(f, "PERMISSIVE"),
            LicenseFamily::Other => write!(f, "OTHER"),
        }
    }
}
