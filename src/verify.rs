//! Verification of the SQL a driver issues when a transaction is opened at a
//! given isolation level.
//!
//! A run toggles the server's general log around a single begin/commit pair,
//! reads back the newest log rows for the session's own thread and checks the
//! relevant statement against the expected text for the server's era.

use crate::error::ProbeError;
use crate::expect::{expectation, rule_for};
use crate::model::{IsolationLevel, Observation, ProbeKind, ServerEra};
use crate::session::Session;
use crate::version::server_era;
use tracing::{debug, info, warn};

pub const DEFAULT_WINDOW: usize = 10;

const ENABLE_LOG: [&str; 2] = [
    "set global log_output = 'table';",
    "set global general_log = 1;",
];
const DISABLE_LOG: &str = "set global general_log = 0;";

pub struct IsolationVerifier<S> {
    session: S,
    window: usize,
    reset_sql: Option<String>,
}

impl<S: Session> IsolationVerifier<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            window: DEFAULT_WINDOW,
            reset_sql: None,
        }
    }

    /// Number of newest log rows scanned for the statement.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Statement run before every verification, e.g. `delete from transactions_test`.
    pub fn with_reset_sql(mut self, sql: impl Into<String>) -> Self {
        self.reset_sql = Some(sql.into());
        self
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    pub fn verify_isolation_statement(
        &mut self,
        level: IsolationLevel,
        expected: &str,
    ) -> Result<Observation, ProbeError> {
        self.verify(ProbeKind::Isolation, level, expected)
    }

    pub fn verify_transaction_start_statement(
        &mut self,
        level: IsolationLevel,
        expected: &str,
    ) -> Result<Observation, ProbeError> {
        self.verify(ProbeKind::Start, level, expected)
    }

    /// Verifies against the 5.7+ expectation table; legacy servers still get
    /// their own fragment.
    pub fn verify_level(
        &mut self,
        kind: ProbeKind,
        level: IsolationLevel,
    ) -> Result<Observation, ProbeError> {
        let expected = expectation(ServerEra::Modern, kind, level).fragment;
        self.verify(kind, level, expected)
    }

    fn verify(
        &mut self,
        kind: ProbeKind,
        level: IsolationLevel,
        expected: &str,
    ) -> Result<Observation, ProbeError> {
        // A blank fragment is contained in every statement.
        if expected.trim().is_empty() {
            return Err(ProbeError::Config(format!(
                "expected fragment for the {kind} statement is empty"
            )));
        }
        if let Some(sql) = &self.reset_sql {
            self.session.execute(sql)?;
        }

        self.capture(level)?;
        let statement = self.find_statement(kind)?;

        let era = server_era(self.session.server_version());
        let (fragment, rule) = match era {
            ServerEra::Legacy => {
                let e = expectation(era, kind, level);
                (e.fragment.to_string(), e.rule)
            }
            ServerEra::Modern => (expected.to_lowercase(), rule_for(era, kind)),
        };
        debug!(%kind, %level, %era, %statement, %fragment, "checking logged statement");

        if !rule.matches(&fragment, &statement) {
            return Err(ProbeError::AssertionMismatch {
                expected: fragment,
                actual: statement,
            });
        }

        info!(%kind, %level, %era, %statement, "verified");
        Ok(Observation {
            kind,
            level,
            era,
            statement,
            matched: fragment,
        })
    }

    /// Opens and commits an empty transaction with the general log switched on.
    /// Logging is switched off again even when the transaction fails.
    fn capture(&mut self, level: IsolationLevel) -> Result<(), ProbeError> {
        for sql in ENABLE_LOG {
            self.session.execute(sql)?;
        }
        let outcome = self
            .session
            .begin_transaction(level)
            .and_then(|tx| tx.commit());
        let disabled = self.session.execute(DISABLE_LOG);
        if let Err(err) = outcome {
            if let Err(disable_err) = disabled {
                warn!(%disable_err, "failed to disable general log");
            }
            return Err(err);
        }
        disabled
    }

    fn find_statement(&mut self, kind: ProbeKind) -> Result<String, ProbeError> {
        let thread_id = self.session.server_thread_id();
        let sql = format!(
            "select convert(argument USING utf8) from mysql.general_log \
             where thread_id = {thread_id} order by event_time desc limit {};",
            self.window
        );
        let entries = self.session.query_strings(&sql)?;
        let keyword = kind.keyword();
        entries
            .into_iter()
            .find(|e| e.to_lowercase().contains(keyword))
            .ok_or(ProbeError::NotFound {
                keyword,
                thread_id,
                window: self.window,
            })
    }
}
