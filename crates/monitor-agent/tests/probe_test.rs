// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs the speedtest adapter against fake executables.

use monitor_agent::error::ProbeError;
use monitor_agent::probe::{BandwidthProbe, ProbeTrigger, TriggerSettings};
use monitor_agent::speedtest::SpeedtestCli;
use serial_test::serial;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

const REPORT: &str = r#"{"ping":{"latency":12.3},"download":{"bandwidth":1250000},"upload":{"bandwidth":625000}}"#;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("speedtest");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn reporting_script(dir: &Path) -> PathBuf {
    write_script(
        dir,
        &format!(
            "[ \"$*\" = \"--accept-license --accept-gdpr --format=json\" ] || exit 9\necho '{REPORT}'"
        ),
    )
}

#[tokio::test]
#[serial]
async fn test_report_converted_to_sample() {
    let dir = TempDir::new().unwrap();
    let cli = SpeedtestCli::new(reporting_script(dir.path()));

    let sample = cli.run(Duration::from_secs(5)).await.unwrap();
    assert_eq!(sample.ping_ms, 12.3);
    assert_eq!(sample.download_mbps, 10.0);
    assert_eq!(sample.upload_mbps, 5.0);
}

#[tokio::test]
#[serial]
async fn test_missing_executable() {
    let dir = TempDir::new().unwrap();
    let cli = SpeedtestCli::new(dir.path().join("speedtest"));

    let err = cli.run(Duration::from_secs(5)).await.unwrap_err();
    assert!(matches!(err, ProbeError::NotFound(_)));
    assert!(err.to_string().ends_with("speedtest not found"));
}

#[tokio::test]
#[serial]
async fn test_non_zero_exit_reports_stderr() {
    let dir = TempDir::new().unwrap();
    let cli = SpeedtestCli::new(write_script(
        dir.path(),
        "echo 'Configuration - Could not retrieve or read configuration' >&2\nexit 2",
    ));

    let err = cli.run(Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "speedtest exited 2: Configuration - Could not retrieve or read configuration"
    );
}

#[tokio::test]
#[serial]
async fn test_malformed_output() {
    let dir = TempDir::new().unwrap();
    let cli = SpeedtestCli::new(write_script(dir.path(), "echo 'Speedtest by Ookla'"));

    let err = cli.run(Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid speedtest JSON response");
}

#[tokio::test]
#[serial]
async fn test_slow_probe_times_out() {
    let dir = TempDir::new().unwrap();
    let cli = SpeedtestCli::new(write_script(dir.path(), "sleep 5"));

    let start = Instant::now();
    let err = cli.run(Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, ProbeError::Timeout));
    assert!(start.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
#[serial]
async fn test_trigger_keeps_last_sample_after_failure() {
    let dir = TempDir::new().unwrap();
    let script = reporting_script(dir.path());
    let trigger = ProbeTrigger::new(
        Arc::new(SpeedtestCli::new(&script)),
        TriggerSettings {
            enabled: true,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
        },
    );
    let start = Instant::now();

    trigger.maybe_trigger(start).unwrap().await.unwrap();
    let ok = trigger.get_status();
    assert_eq!(ok.ping_ms, Some(12.3));
    assert_eq!(ok.last_error, None);

    fs::remove_file(&script).unwrap();
    trigger
        .maybe_trigger(start + Duration::from_secs(10))
        .unwrap()
        .await
        .unwrap();
    let failed = trigger.get_status();
    assert!(failed.last_error.unwrap().ends_with("speedtest not found"));
    assert_eq!(failed.ping_ms, Some(12.3));
    assert_eq!(failed.download_mbps, Some(10.0));
    assert_eq!(failed.upload_mbps, Some(5.0));
    assert_eq!(failed.last_updated_ts, ok.last_updated_ts);
    assert!(!failed.in_progress);
}
