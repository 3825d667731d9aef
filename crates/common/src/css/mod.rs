//! Structural CSS comparison.
//!
//! Both documents are parsed into rule-sets keyed by selector and at-rule
//! context, so ordering, formatting and comments never affect the outcome.
//! Box longhands are folded into their shorthand on both sides.

mod normalize;
mod parser;
mod shorthand;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::Result;

pub use normalize::{normalize, TextKind};

/// Property name to normalized value
pub type Declarations = BTreeMap<String, String>;

/// Identifies one rule: the chain of enclosing at-rules plus the selector.
///
/// Declarations written directly inside an at-rule block (`@font-face`) use
/// the empty selector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RuleKey {
    pub context: Vec<String>,
    pub selector: String,
}

impl RuleKey {
    pub fn new(context: Vec<String>, selector: String) -> Self {
        Self { context, selector }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for at_rule in &self.context {
            write!(f, "{} > ", at_rule)?;
        }
        if self.selector.is_empty() {
            write!(f, "(at-rule body)")
        } else {
            write!(f, "{}", self.selector)
        }
    }
}

/// A parsed stylesheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stylesheet {
    rules: BTreeMap<RuleKey, Declarations>,
}

impl Stylesheet {
    pub fn parse(source: &str) -> Result<Self> {
        parser::parse(source)
    }

    pub fn get(&self, key: &RuleKey) -> Option<&Declarations> {
        self.rules.get(key)
    }

    pub fn rules(&self) -> impl Iterator<Item = (&RuleKey, &Declarations)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check that every rule of `expected` appears in this stylesheet
    pub fn includes(&self, expected: &Stylesheet, mode: RuleMatch) -> CssReport {
        let mut report = CssReport::default();

        for (key, wanted) in &expected.rules {
            let Some(found) = self.rules.get(key) else {
                report.missing.push(key.clone());
                continue;
            };
            let matches = match mode {
                RuleMatch::Exact => found == wanted,
                RuleMatch::Subset => wanted.iter().all(|(name, value)| found.get(name) == Some(value)),
            };
            if !matches {
                report.mismatched.push(RuleMismatch {
                    key: key.clone(),
                    expected: wanted.clone(),
                    actual: found.clone(),
                });
            }
        }

        report
    }
}

/// How declarations of a matched rule are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleMatch {
    /// The rule's declarations must equal the expected ones
    #[default]
    Exact,
    /// The expected declarations must be present; extra ones are allowed
    Subset,
}

/// A rule present on both sides whose declarations disagree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleMismatch {
    pub key: RuleKey,
    pub expected: Declarations,
    pub actual: Declarations,
}

/// Outcome of a containment check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CssReport {
    pub missing: Vec<RuleKey>,
    pub mismatched: Vec<RuleMismatch>,
}

impl CssReport {
    pub fn is_match(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

impl fmt::Display for CssReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match() {
            return write!(f, "all expected rules present");
        }
        for key in &self.missing {
            writeln!(f, "missing rule: {}", key)?;
        }
        for mismatch in &self.mismatched {
            writeln!(f, "declarations differ for {}:", mismatch.key)?;
            write_declarations(f, "expected", &mismatch.expected)?;
            write_declarations(f, "actual", &mismatch.actual)?;
        }
        Ok(())
    }
}

fn write_declarations(f: &mut fmt::Formatter<'_>, label: &str, declarations: &Declarations) -> fmt::Result {
    write!(f, "  {}: {{", label)?;
    for (name, value) in declarations {
        write!(f, " {}: {};", name, value)?;
    }
    writeln!(f, " }}")
}

/// Compare two CSS documents
pub fn compare_css(actual: &str, expected: &str, mode: RuleMatch) -> Result<CssReport> {
    let actual = Stylesheet::parse(actual)?;
    let expected = Stylesheet::parse(expected)?;
    Ok(actual.includes(&expected, mode))
}

/// True when every rule of `expected` appears in `actual` with the same
/// declarations. Unparseable input never matches.
pub fn includes_css(actual: &str, expected: &str) -> bool {
    match compare_css(actual, expected, RuleMatch::Exact) {
        Ok(report) => report.is_match(),
        Err(e) => {
            debug!("CSS comparison failed: {}", e);
            false
        }
    }
}
