//! Output generation mode selected by the `OXIDE` feature flag

use serde::{Deserialize, Serialize};

/// Environment variable selecting the output mode
pub const OXIDE_ENV: &str = "OXIDE";

/// Which flavor of CSS the build pipeline emits.
///
/// Legacy output spells colors through opacity custom properties
/// (`--tw-bg-opacity`), the oxide engine emits resolved values directly.
/// Only expected literals differ; harness behavior is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Legacy,
    Oxide,
}

impl OutputMode {
    /// Read the mode from the process environment
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(OXIDE_ENV).ok().as_deref())
    }

    /// Interpret a raw flag value; unset, empty, `0` and `false` mean legacy
    pub fn from_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("0") => OutputMode::Legacy,
            Some(v) if v.eq_ignore_ascii_case("false") => OutputMode::Legacy,
            Some(_) => OutputMode::Oxide,
        }
    }

    pub fn is_oxide(self) -> bool {
        self == OutputMode::Oxide
    }

    /// Choose the expectation matching this mode
    pub fn pick<T>(self, legacy: T, oxide: T) -> T {
        match self {
            OutputMode::Legacy => legacy,
            OutputMode::Oxide => oxide,
        }
    }
}
