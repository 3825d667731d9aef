//! Harness behavior against shell stand-ins for a bundler.
//!
//! `sh` one-liners play the build tool: a one-shot copy for production builds
//! and a polling loop for watch mode.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use cssbuild_common::syntax::css;
use cssbuild_common::{includes_css, HarnessConfig, OutputMode, SandboxMode, TimeoutConfig};
use cssbuild_e2e::scenarios::Scenario;
use cssbuild_e2e::{E2eError, E2eResult, Integration, Sandbox, SuiteRunner};

const BUILD: &str = "mkdir -p dist && cp src/index.css dist/main.css";

/// Rewrites the output only when the source differs from it
const WATCH: &str = r#"while true; do
  if [ "$(cat src/index.css)" != "$(cat dist/main.css 2>/dev/null)" ]; then
    mkdir -p dist; cp src/index.css dist/main.css
  fi
  sleep 0.05
done"#;

fn config(root: &Path) -> HarnessConfig {
    HarnessConfig {
        project_root: root.to_path_buf(),
        command_prefix: None,
        timeouts: TimeoutConfig {
            creation_ms: 5_000,
            change_ms: 5_000,
            stop_ms: 2_000,
            scenario_ms: 20_000,
            poll_interval_ms: 20,
            settle_ms: 50,
        },
        ..HarnessConfig::default()
    }
}

fn integration() -> Integration {
    let sandbox = Sandbox::empty().unwrap();
    let config = config(sandbox.root());
    Integration::with_sandbox(sandbox, &config, OutputMode::Legacy)
}

#[tokio::test]
async fn one_shot_build_output_is_checked() {
    let ctx = integration();
    ctx.write_input_file("index.css", ".font-bold { font-weight: 700; }\n")
        .await
        .unwrap();

    let result = ctx.run(BUILD).await.unwrap();
    assert!(result.status.success());

    ctx.expect_output_css(
        "main.css",
        &css(
            r#"
            .font-bold {
              font-weight: 700;
            }
            "#,
        ),
    )
    .await
    .unwrap();

    let err = ctx
        .expect_output_css("main.css", ".font-bold { font-weight: 400; }")
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::AssertionMismatch { .. }));
}

#[tokio::test]
async fn failing_build_reports_output() {
    let ctx = integration();
    let err = ctx.run("echo broken config >&2; exit 3").await.unwrap_err();
    match err {
        E2eError::NonZeroExit { stderr, status, .. } => {
            assert!(stderr.contains("broken config"));
            assert!(status.contains('3'));
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
}

#[tokio::test]
async fn output_mode_reaches_the_child() {
    let sandbox = Sandbox::empty().unwrap();
    let config = config(sandbox.root());
    let ctx = Integration::with_sandbox(sandbox, &config, OutputMode::Oxide);

    let result = ctx.run("echo \"oxide=${OXIDE:-unset}\"").await.unwrap();
    assert_eq!(result.stdout.trim(), "oxide=1");
}

#[tokio::test]
async fn watcher_accumulates_rules_across_changes() {
    let ctx = integration();
    ctx.write_input_file("index.css", ".font-bold { font-weight: 700; }\n")
        .await
        .unwrap();

    let mut process = ctx.spawn(WATCH).unwrap();
    ctx.wait_for_output_file_creation("main.css").await.unwrap();
    ctx.expect_output_css("main.css", ".font-bold { font-weight: 700; }")
        .await
        .unwrap();

    ctx.wait_for_output_file_change("main.css", || {
        ctx.append_to_input_file("index.css", ".font-normal { font-weight: 400; }\n")
    })
    .await
    .unwrap();

    let output = ctx.read_output_file("main.css").await.unwrap();
    assert!(includes_css(
        &output,
        ".font-bold { font-weight: 700; } .font-normal { font-weight: 400; }"
    ));

    let status = process.stop().await.unwrap();
    assert!(status.is_some());
    assert!(!process.is_running());

    // Nothing rewrites the output once the watcher is gone.
    ctx.write_input_file("index.css", ".late { color: red; }\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let output = ctx.read_output_file("main.css").await.unwrap();
    assert!(!output.contains(".late"));
}

#[tokio::test]
async fn trigger_without_rebuild_times_out() {
    let ctx = integration();
    ctx.write_input_file("index.css", ".a { color: red; }\n").await.unwrap();
    ctx.run(BUILD).await.unwrap();

    let err = ctx
        .waiter()
        .wait_for_change(
            "main.css",
            || ctx.write_input_file("index.html", "<div></div>"),
            Duration::from_millis(300),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, E2eError::Timeout { .. }));
}

#[tokio::test]
async fn creation_wait_times_out_without_build() {
    let sandbox = Sandbox::empty().unwrap();
    let mut config = config(sandbox.root());
    config.timeouts.creation_ms = 200;
    let ctx = Integration::with_sandbox(sandbox, &config, OutputMode::Legacy);

    let err = ctx.wait_for_output_file_creation("main.css").await.unwrap_err();
    match err {
        E2eError::Timeout { timeout, .. } => assert_eq!(timeout, Duration::from_millis(200)),
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn stopping_an_exited_process_is_a_no_op() {
    let ctx = integration();
    let mut process = ctx.spawn("echo done").unwrap();

    process
        .wait_for_stdout(|line| line == "done", Duration::from_secs(5))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let first = process.stop().await.unwrap();
    let second = process.stop().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn stderr_lines_can_be_awaited() {
    let ctx = integration();
    let mut process = ctx
        .spawn("echo 'compiled successfully' >&2; sleep 30")
        .unwrap();

    let line = process
        .wait_for_stderr(|line| line.contains("compiled"), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(line, "compiled successfully");
    assert!(process.is_running());

    process.stop().await.unwrap();
    assert!(!process.is_running());
}

async fn build_and_check(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file("index.css", ".ok { color: green; }\n").await?;
    ctx.run(BUILD).await?;
    ctx.expect_output_css("main.css", ".ok { color: green; }").await
}

async fn wrong_expectation(ctx: &Integration) -> E2eResult<()> {
    ctx.write_input_file("index.css", ".ok { color: green; }\n").await?;
    ctx.run(BUILD).await?;
    ctx.expect_output_css("main.css", ".ok { color: red; }").await
}

fn template() -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/index.css"), ".original {}\n").unwrap();
    dir
}

#[tokio::test]
async fn runner_reports_each_scenario() {
    let template = template();
    let runner = SuiteRunner::new(config(template.path()), OutputMode::Legacy);

    let scenarios = [
        Scenario {
            name: "passes",
            tags: &["local"],
            run: |ctx| Box::pin(build_and_check(ctx)),
        },
        Scenario {
            name: "fails",
            tags: &["local"],
            run: |ctx| Box::pin(wrong_expectation(ctx)),
        },
    ];

    let suite = runner.run_scenarios(&scenarios).await.unwrap();
    assert_eq!(suite.total, 2);
    assert_eq!(suite.passed, 1);
    assert_eq!(suite.failed, 1);
    assert!(suite.results[0].success);
    assert!(suite.results[1].error.as_deref().unwrap().contains("color"));

    // Copy mode never touches the template.
    assert_eq!(
        fs::read_to_string(template.path().join("src/index.css")).unwrap(),
        ".original {}\n"
    );
    assert!(!template.path().join("dist").exists());
}

#[tokio::test]
async fn in_place_scenarios_are_restored() {
    let template = template();
    let mut config = config(template.path());
    config.sandbox = SandboxMode::InPlace;
    let runner = SuiteRunner::new(config, OutputMode::Legacy);

    let scenario = Scenario {
        name: "in-place",
        tags: &[],
        run: |ctx| Box::pin(build_and_check(ctx)),
    };
    let suite = runner.run_scenarios(&[scenario]).await.unwrap();
    assert!(suite.success());

    assert_eq!(
        fs::read_to_string(template.path().join("src/index.css")).unwrap(),
        ".original {}\n"
    );
    assert!(!template.path().join("dist").exists());
}

/// A background child that drops a `leaked` marker in the project after a second
const LEAKY: &str = "(sleep 1; touch leaked) &";

/// Long enough for an orphaned `LEAKY` child to have written its marker
async fn outlive_leaky_child() {
    tokio::time::sleep(Duration::from_millis(1_500)).await;
}

#[tokio::test]
async fn scenario_timeout_fails_and_kills_the_build() {
    let template = template();
    let mut config = config(template.path());
    config.sandbox = SandboxMode::InPlace;
    config.timeouts.scenario_ms = 200;
    let runner = SuiteRunner::new(config, OutputMode::Legacy);

    async fn slow_build(ctx: &Integration) -> E2eResult<()> {
        ctx.run(&format!("{LEAKY} wait")).await?;
        Ok(())
    }

    let scenario = Scenario {
        name: "slow",
        tags: &[],
        run: |ctx| Box::pin(slow_build(ctx)),
    };
    let result = runner.run_scenario(&scenario).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("Timeout"));

    outlive_leaky_child().await;
    assert!(!template.path().join("leaked").exists());
}

#[tokio::test]
async fn cancelled_run_kills_the_process_group() {
    let ctx = integration();
    let cancelled = tokio::time::timeout(
        Duration::from_millis(200),
        ctx.run(&format!("{LEAKY} wait")),
    )
    .await;
    assert!(cancelled.is_err());

    outlive_leaky_child().await;
    assert!(!ctx.root().join("leaked").exists());
}

#[tokio::test]
async fn stop_escalates_when_sigterm_is_ignored() {
    let sandbox = Sandbox::empty().unwrap();
    let mut config = config(sandbox.root());
    config.timeouts.stop_ms = 300;
    let ctx = Integration::with_sandbox(sandbox, &config, OutputMode::Legacy);

    let mut process = ctx.spawn("trap '' TERM; echo ready; sleep 30").unwrap();
    process
        .wait_for_stdout(|line| line == "ready", Duration::from_secs(5))
        .await
        .unwrap();

    let started = Instant::now();
    let status = process.stop().await.unwrap();
    let elapsed = started.elapsed();

    assert!(status.is_some_and(|s| !s.success()));
    assert!(elapsed >= Duration::from_millis(300), "stopped after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "stopped after {elapsed:?}");
    assert!(!process.is_running());
}

#[tokio::test]
async fn stop_takes_down_background_children() {
    let ctx = integration();
    let mut process = ctx.spawn(&format!("{LEAKY} sleep 30")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    process.stop().await.unwrap();

    outlive_leaky_child().await;
    assert!(!ctx.root().join("leaked").exists());
}

#[tokio::test]
async fn stop_after_shell_exit_still_reaps_children() {
    let ctx = integration();
    let mut process = ctx.spawn(&format!("{LEAKY} exit 0")).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Observing the exit first must not let stop() skip the group.
    assert!(!process.is_running());
    process.stop().await.unwrap();
    drop(process);

    outlive_leaky_child().await;
    assert!(!ctx.root().join("leaked").exists());
}

#[tokio::test]
async fn dropped_handle_kills_background_children() {
    let ctx = integration();
    let process = ctx.spawn(&format!("{LEAKY} sleep 30")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    drop(process);

    outlive_leaky_child().await;
    assert!(!ctx.root().join("leaked").exists());
}

#[tokio::test]
async fn dropped_handle_after_shell_exit_kills_children() {
    let ctx = integration();
    let mut process = ctx.spawn(&format!("{LEAKY} exit 0")).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!process.is_running());

    drop(process);

    outlive_leaky_child().await;
    assert!(!ctx.root().join("leaked").exists());
}
