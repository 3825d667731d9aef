//! Scenarios exercising the bundler integration.
//!
//! Each scenario receives a fresh [`Integration`] and returns an error on the
//! first failed step.

use futures::future::BoxFuture;

use crate::error::E2eResult;
use crate::integration::Integration;

pub mod static_build;
pub mod watcher;

/// Output file emitted by the bundler
pub const OUTPUT_CSS: &str = "main.css";

/// Config file next to the source root
pub const CONFIG_JS: &str = "../tailwind.config.js";
pub const CONFIG_TS: &str = "../tailwind.config.ts";

pub type ScenarioFn = for<'a> fn(&'a Integration) -> BoxFuture<'a, E2eResult<()>>;

/// A named, tagged scenario
#[derive(Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub tags: &'static [&'static str],
    pub run: ScenarioFn,
}

impl Scenario {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag)
    }
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish()
    }
}

/// Every scenario, in execution order
pub fn all() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "static-build/generates-output",
            tags: &["static"],
            run: |ctx| Box::pin(static_build::generates_output(ctx)),
        },
        Scenario {
            name: "static-build/esm-config",
            tags: &["static", "config"],
            run: |ctx| Box::pin(static_build::esm_config(ctx)),
        },
        Scenario {
            name: "static-build/typescript-config",
            tags: &["static", "config"],
            run: |ctx| Box::pin(static_build::typescript_config(ctx)),
        },
        Scenario {
            name: "watcher/html-changes",
            tags: &["watch"],
            run: |ctx| Box::pin(watcher::html_changes(ctx)),
        },
        Scenario {
            name: "watcher/globbed-files",
            tags: &["watch"],
            run: |ctx| Box::pin(watcher::globbed_files(ctx)),
        },
        Scenario {
            name: "watcher/config-changes",
            tags: &["watch", "config"],
            run: |ctx| Box::pin(watcher::config_changes(ctx)),
        },
        Scenario {
            name: "watcher/css-changes",
            tags: &["watch"],
            run: |ctx| Box::pin(watcher::css_changes(ctx)),
        },
        Scenario {
            name: "watcher/safelist",
            tags: &["watch", "config"],
            run: |ctx| Box::pin(watcher::safelist(ctx)),
        },
    ]
}

/// Look a scenario up by exact name
pub fn find(name: &str) -> Option<Scenario> {
    all().into_iter().find(|s| s.name == name)
}
