//! Assertions that report expected vs. actual instead of panicking.

use crate::error::{ScenarioError, ScenarioResult};
use std::fmt::Debug;

pub fn expect_eq<T: PartialEq + Debug>(what: &str, expected: T, actual: T) -> ScenarioResult {
    if expected == actual {
        Ok(())
    } else {
        Err(ScenarioError::Assertion {
            what: what.to_string(),
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        })
    }
}

pub fn expect_contains(what: &str, haystack: &str, needle: &str) -> ScenarioResult {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(ScenarioError::Assertion {
            what: what.to_string(),
            expected: format!("text containing {:?}", needle),
            actual: format!("{:?}", haystack),
        })
    }
}

/// Same elements with the same multiplicity, in any order.
pub fn expect_same_members(what: &str, expected: &[String], actual: &[String]) -> ScenarioResult {
    let mut want = expected.to_vec();
    let mut got = actual.to_vec();
    want.sort();
    got.sort();
    if want == got {
        Ok(())
    } else {
        Err(ScenarioError::Assertion {
            what: what.to_string(),
            expected: format!("{:?} in any order", expected),
            actual: format!("{:?}", actual),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn eq_reports_both_sides() {
        assert!(expect_eq("rows", 1, 1).is_ok());
        let err = expect_eq("rows", 1, 2).unwrap_err();
        assert!(err.is_assertion());
        assert_eq!(err.to_string(), "rows: expected 1, got 2");
    }

    #[test]
    fn contains_matches_substring() {
        assert!(expect_contains("title", "Time Keeper | Home", "Time Keeper").is_ok());
        let err = expect_contains("title", "Home", "Time Keeper").unwrap_err();
        assert!(err.to_string().contains("text containing \"Time Keeper\""));
    }

    #[test]
    fn same_members_ignores_order_but_not_multiplicity() {
        let expected = strings(&["Africa/Tunis", "Asia/Tokyo"]);
        assert!(expect_same_members("zones", &expected, &strings(&["Asia/Tokyo", "Africa/Tunis"])).is_ok());
        assert!(expect_same_members("zones", &expected, &strings(&["Asia/Tokyo"])).is_err());
        assert!(expect_same_members(
            "zones",
            &expected,
            &strings(&["Asia/Tokyo", "Africa/Tunis", "Asia/Tokyo"])
        )
        .is_err());
    }
}
