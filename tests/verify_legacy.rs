mod common;

use isolation_probe::{IsolationLevel, IsolationVerifier, ProbeError, ProbeKind, ServerEra};

#[test]
fn legacy_server_requires_serializable() -> anyhow::Result<()> {
    let server = common::spawn_server("5.6.51-log")?;
    let session = common::session_with_retry(&server.url())?;
    let mut verifier = IsolationVerifier::new(session);

    // The caller's fragment is ignored on pre-5.7 servers.
    let obs = verifier.verify_isolation_statement(IsolationLevel::Serializable, "read committed")?;
    assert_eq!(obs.era, ServerEra::Legacy);
    assert_eq!(obs.matched, "serializable");

    for level in [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
    ] {
        let err = verifier
            .verify_isolation_statement(level, level.sql_name())
            .unwrap_err();
        match err {
            ProbeError::AssertionMismatch { expected, .. } => assert_eq!(expected, "serializable"),
            other => panic!("{level}: unexpected error {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn legacy_start_statement_is_contained() -> anyhow::Result<()> {
    let server = common::spawn_server("5.6.51-log")?;
    let session = common::session_with_retry(&server.url())?;
    let mut verifier = IsolationVerifier::new(session);

    for level in IsolationLevel::ALL {
        let obs = verifier.verify_level(ProbeKind::Start, level)?;
        assert_eq!(obs.era, ServerEra::Legacy);
        assert!(obs.statement.to_lowercase().starts_with("start transaction"));
    }
    Ok(())
}
