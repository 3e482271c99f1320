mod common;

use std::process::Command;

#[test]
fn matrix_passes_against_modern_fixture() -> anyhow::Result<()> {
    let server = common::spawn_server("8.0.30-probe")?;
    let out = Command::new(common::BIN)
        .args(["matrix", "--url", &server.url()])
        .output()?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "matrix failed:\n{stdout}");
    assert_eq!(stdout.lines().filter(|l| l.contains(" ok ")).count(), 12);
    assert!(stdout.contains("START TRANSACTION WITH CONSISTENT SNAPSHOT"));
    Ok(())
}

#[test]
fn check_reports_mismatch_with_failure_status() -> anyhow::Result<()> {
    let server = common::spawn_server("8.0.30-probe")?;
    let url = server.url();

    let ok = Command::new(common::BIN)
        .args(["check", "--url", &url, "--level", "read-committed"])
        .output()?;
    assert!(ok.status.success());
    assert!(String::from_utf8_lossy(&ok.stdout).contains("READ COMMITTED"));

    let bad = Command::new(common::BIN)
        .args([
            "check",
            "--url",
            &url,
            "--probe",
            "start",
            "--level",
            "snapshot",
            "--expect",
            "start transaction",
        ])
        .output()?;
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("expected 'start transaction'"));
    Ok(())
}

#[test]
fn check_refuses_blank_expectation() -> anyhow::Result<()> {
    let server = common::spawn_server("8.0.30-probe")?;
    let out = Command::new(common::BIN)
        .args([
            "check",
            "--url",
            &server.url(),
            "--level",
            "serializable",
            "--expect",
            "",
        ])
        .output()?;
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("is empty"));
    Ok(())
}
