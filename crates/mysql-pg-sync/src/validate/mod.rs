//! Row-count validation.
//!
//! Small tables must match exactly; large tables may drift within a
//! relative tolerance, since sources that stay live during extraction can
//! gain or lose rows between the read and the count.

use serde::Serialize;

/// Result of validating one table's row counts.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub passed: bool,
    pub detail: String,
}

/// Compare source and target row counts under the threshold/tolerance policy.
pub fn validate_counts(
    table: &str,
    source_rows: i64,
    target_rows: i64,
    tolerance: f64,
    small_table_threshold: i64,
) -> ValidationOutcome {
    let (passed, detail) = if source_rows <= small_table_threshold {
        if source_rows == target_rows {
            (true, format!("exact match ({} rows)", source_rows))
        } else {
            (
                false,
                format!(
                    "expected exactly {} rows, found {}",
                    source_rows, target_rows
                ),
            )
        }
    } else {
        let drift = (source_rows - target_rows).abs() as f64 / source_rows as f64;
        if drift <= tolerance {
            (
                true,
                format!(
                    "{} vs {} rows, drift {:.4}% within tolerance",
                    source_rows,
                    target_rows,
                    drift * 100.0
                ),
            )
        } else {
            (
                false,
                format!(
                    "{} vs {} rows, drift {:.4}% exceeds tolerance {:.4}%",
                    source_rows,
                    target_rows,
                    drift * 100.0,
                    tolerance * 100.0
                ),
            )
        }
    };

    ValidationOutcome {
        table: table.to_string(),
        source_rows,
        target_rows,
        passed,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_table_exact_match() {
        let r = validate_counts("t", 500, 500, 0.001, 10_000);
        assert!(r.passed);
    }

    #[test]
    fn test_small_table_off_by_one_fails() {
        let r = validate_counts("t", 500, 499, 0.001, 10_000);
        assert!(!r.passed);
        assert!(r.detail.contains("expected exactly 500"));
    }

    #[test]
    fn test_empty_table_matches() {
        assert!(validate_counts("t", 0, 0, 0.001, 10_000).passed);
    }

    #[test]
    fn test_large_table_within_tolerance() {
        // 1M source rows, 999 missing: drift just under 0.1%.
        let r = validate_counts("t", 1_000_000, 999_001, 0.001, 10_000);
        assert!(r.passed);
    }

    #[test]
    fn test_large_table_exceeds_tolerance() {
        let r = validate_counts("t", 1_000_000, 990_000, 0.001, 10_000);
        assert!(!r.passed);
        assert!(r.detail.contains("exceeds tolerance"));
    }

    #[test]
    fn test_large_table_target_surplus_within_tolerance() {
        // Drift is absolute: extra target rows count too.
        let r = validate_counts("t", 1_000_000, 1_000_500, 0.001, 10_000);
        assert!(r.passed);
        let r = validate_counts("t", 1_000_000, 1_002_000, 0.001, 10_000);
        assert!(!r.passed);
    }

    #[test]
    fn test_threshold_boundary_is_exact() {
        // Exactly at the threshold still demands an exact match.
        let r = validate_counts("t", 10_000, 9_999, 0.001, 10_000);
        assert!(!r.passed);
    }
}
