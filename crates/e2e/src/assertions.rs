//! CSS assertions that fail scenarios with a readable report

use cssbuild_common::css::{compare_css, RuleMatch};

use crate::error::{E2eError, E2eResult};

/// Fail with `AssertionMismatch` unless `actual` includes every rule of
/// `expected` with exactly the expected declarations
pub fn assert_includes_css(label: &str, actual: &str, expected: &str) -> E2eResult<()> {
    assert_css(label, actual, expected, RuleMatch::Exact)
}

/// Like [`assert_includes_css`] with a choice of per-rule matching
pub fn assert_css(label: &str, actual: &str, expected: &str, mode: RuleMatch) -> E2eResult<()> {
    let report = compare_css(actual, expected, mode)?;
    if report.is_match() {
        return Ok(());
    }
    Err(E2eError::AssertionMismatch {
        path: label.to_string(),
        report: report.to_string(),
    })
}
