use entryfix_core::services::{
    CommandSpec, Oracle, OracleConfig, OracleError, OracleResult, OutputMarkers, ProcessOracle,
};

#[test]
fn first_unresolved_marker_wins_and_last_counter_is_reported() {
    let markers = OutputMarkers::defaults().unwrap();
    let output = "boot\nTotal calls: 10\nNo func at 0x00101234\nTotal calls: 12\nNo func at 0x2000\n";
    let report = markers.parse(output, false);
    assert_eq!(report.result, OracleResult::UnresolvedCall(0x0010_1234));
    assert_eq!(report.work_completed, Some(12));
}

#[test]
fn clean_output_is_ok_and_timeout_overrides_faults() {
    let markers = OutputMarkers::defaults().unwrap();
    let clean = markers.parse("all good\n", false);
    assert_eq!(clean.result, OracleResult::Ok);
    assert_eq!(clean.work_completed, None);

    let timed_out = markers.parse("Total calls: 3\nNo func at 0x1000\n", true);
    assert_eq!(timed_out.result, OracleResult::Timeout);
    assert_eq!(timed_out.work_completed, Some(3));
}

#[test]
fn custom_patterns_are_honoured() {
    let markers = OutputMarkers::new(r"missing fn ([0-9a-f]+)", r"dispatched=(\d+)").unwrap();
    let report = markers.parse("dispatched=4\nmissing fn 80001000\n", false);
    assert_eq!(report.result, OracleResult::UnresolvedCall(0x8000_1000));
    assert_eq!(report.work_completed, Some(4));
}

#[test]
fn invalid_pattern_is_reported() {
    let err = OutputMarkers::new("(", r"(\d+)").unwrap_err();
    assert!(matches!(err, OracleError::Pattern { .. }));
}

#[test]
fn config_defaults_fill_in_from_json() {
    let config: OracleConfig =
        serde_json::from_str(r#"{ "run": { "program": "./game" } }"#).unwrap();
    assert!(config.prepare.is_empty());
    assert_eq!(config.timeout_seconds, 20);
    assert_eq!(config.unresolved_pattern, r"No func at (0x[0-9a-fA-F]+)");
    assert_eq!(config.progress_pattern, r"Total calls: (\d+)");
}

#[test]
fn missing_program_is_a_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = OracleConfig::new(CommandSpec::new("./definitely-not-here"));
    let mut oracle = ProcessOracle::from_config(&config, dir.path(), None).unwrap();
    assert!(matches!(oracle.invoke(), Err(OracleError::Launch { .. })));
}

#[cfg(unix)]
mod unix {
    use std::time::{Duration, Instant};

    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[test]
    fn stderr_fault_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let config = OracleConfig::new(sh("echo 'Total calls: 5'; echo 'No func at 0x1010' >&2"));
        let mut oracle = ProcessOracle::from_config(&config, dir.path(), None).unwrap();
        let report = oracle.invoke().unwrap();
        assert_eq!(report.result, OracleResult::UnresolvedCall(0x1010));
        assert_eq!(report.work_completed, Some(5));
    }

    #[test]
    fn slow_run_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let config = OracleConfig::new(sh("echo 'Total calls: 1'; exec sleep 5"));
        let mut oracle = ProcessOracle::from_config(&config, dir.path(), Some(1)).unwrap();
        let report = oracle.invoke().unwrap();
        assert_eq!(report.result, OracleResult::Timeout);
        assert_eq!(report.work_completed, Some(1));
    }

    #[test]
    fn timeout_stops_processes_the_run_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let config = OracleConfig::new(sh("echo 'Total calls: 1'; sleep 8; echo after"));
        let mut oracle = ProcessOracle::from_config(&config, dir.path(), Some(1)).unwrap();

        let started = Instant::now();
        let report = oracle.invoke().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.result, OracleResult::Timeout);
        assert_eq!(report.work_completed, Some(1));
        assert!(elapsed < Duration::from_secs(4), "1s budget took {elapsed:?}");
    }

    #[test]
    fn background_child_holding_output_open_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        // The shell exits at once but leaves a detached sleeper with the pipes.
        let config = OracleConfig::new(sh("echo 'No func at 0x1010'; (sleep 8 &)"));
        let mut oracle = ProcessOracle::from_config(&config, dir.path(), Some(5)).unwrap();

        let started = Instant::now();
        let report = oracle.invoke().unwrap();

        assert_eq!(report.result, OracleResult::UnresolvedCall(0x1010));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn prepare_steps_run_in_the_project_root_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OracleConfig::new(sh("cat built.txt"));
        config.prepare.push(sh("echo 'No func at 0x2000' > built.txt; echo done").with_marker("done"));
        let mut oracle = ProcessOracle::from_config(&config, dir.path(), None).unwrap();
        let report = oracle.invoke().unwrap();
        assert_eq!(report.result, OracleResult::UnresolvedCall(0x2000));
    }

    #[test]
    fn failing_prepare_step_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OracleConfig::new(sh("true"));
        config.prepare.push(sh("exit 3"));
        let mut oracle = ProcessOracle::from_config(&config, dir.path(), None).unwrap();
        assert!(matches!(oracle.invoke(), Err(OracleError::StepFailed { .. })));
    }

    #[test]
    fn missing_success_marker_fails_the_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OracleConfig::new(sh("true"));
        config.prepare.push(sh("echo 'built with warnings'").with_marker("Build succeeded"));
        let mut oracle = ProcessOracle::from_config(&config, dir.path(), None).unwrap();
        let err = oracle.invoke().unwrap_err();
        assert!(err.to_string().contains("Build succeeded"));
    }
}
