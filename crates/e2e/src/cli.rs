//! Command line of the scenario binary

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cssbuild-e2e")]
#[command(about = "End-to-end scenarios for the CSS build integrations")]
pub struct Args {
    /// Harness configuration file
    #[arg(short, long, env = "CSSBUILD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Integration project, relative to the workspace root
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Run only scenarios carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Run only the scenario with this exact name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Mutate the project directly instead of a temporary copy
    #[arg(long)]
    pub in_place: bool,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    pub output: PathBuf,

    /// Substring filter on scenario names
    pub filter: Option<String>,
}

/// libtest switches cargo may pass along
const LIBTEST_SWITCHES: &[&str] = &[
    "--nocapture",
    "--show-output",
    "--quiet",
    "-q",
    "--exact",
    "--ignored",
    "--include-ignored",
    "--bench",
];

/// libtest options taking a value, as `--opt value` or `--opt=value`
const LIBTEST_OPTIONS: &[&str] = &["--test-threads", "--color", "--format", "--logfile", "--skip"];

/// Drop libtest arguments so ours parse strictly
pub fn strip_libtest_flags(raw: Vec<String>) -> Vec<String> {
    let mut kept = Vec::with_capacity(raw.len());
    let mut args = raw.into_iter();
    while let Some(arg) = args.next() {
        if LIBTEST_SWITCHES.contains(&arg.as_str()) {
            continue;
        }
        if LIBTEST_OPTIONS.contains(&arg.as_str()) {
            args.next();
            continue;
        }
        if LIBTEST_OPTIONS
            .iter()
            .any(|opt| arg.strip_prefix(opt).is_some_and(|rest| rest.starts_with('=')))
        {
            continue;
        }
        kept.push(arg);
    }
    kept
}
