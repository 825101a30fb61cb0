//! Fingerprint-count admission policy.

use serde::{Deserialize, Serialize};

/// Smallest fingerprint count the matching service accepts.
pub const MIN_FINGERPRINTS: usize = 8;
/// Largest fingerprint count the matching service accepts.
pub const MAX_FINGERPRINTS: usize = 3500;

/// Outcome of checking a fingerprint count against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    TooSmall,
    TooBig,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }

    pub fn describe(self) -> &'static str {
        match self {
            Admission::Admitted => "admitted for snippet analysis",
            Admission::TooSmall => "too small for snippet analysis",
            Admission::TooBig => "too big for snippet analysis",
        }
    }
}

/// Inclusive `[min, max]` gate on the number of fingerprints a file produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    pub min: usize,
    pub max: usize,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            min: MIN_FINGERPRINTS,
            max: MAX_FINGERPRINTS,
        }
    }
}

impl AdmissionPolicy {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn check(&self, fingerprint_count: usize) -> Admission {
        if fingerprint_count < self.min {
            Admission::TooSmall
        } else if fingerprint_count > self.max {
            Admission::TooBig
        } else {
            Admission::Admitted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_boundaries() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.check(0), Admission::TooSmall);
        assert_eq!(policy.check(7), Admission::TooSmall);
        assert_eq!(policy.check(8), Admission::Admitted);
        assert_eq!(policy.check(3500), Admission::Admitted);
        assert_eq!(policy.check(3501), Admission::TooBig);
    }

    #[test]
    fn test_custom_bounds() {
        let policy = AdmissionPolicy::new(2, 4);
        assert!(!policy.check(1).is_admitted());
        assert!(policy.check(2).is_admitted());
        assert!(policy.check(4).is_admitted());
        assert_eq!(policy.check(5), Admission::TooBig);
    }

    #[test]
    fn test_describe() {
        assert_eq!(Admission::TooSmall.describe(), "too small for snippet analysis");
        assert_eq!(Admission::TooBig.describe(), "too big for snippet analysis");
    }
}
