use crate::model::{CommandType, LogRecord};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

/// Rows kept before the oldest are discarded.
pub const MAX_LOG_ROWS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogOutput {
    pub table: bool,
    pub file: bool,
}

impl LogOutput {
    /// Parses a `log_output` value such as `'TABLE'` or `TABLE,FILE`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut out = LogOutput::default();
        for part in value.split(',') {
            match part.trim().to_ascii_uppercase().as_str() {
                "TABLE" => out.table = true,
                "FILE" => out.file = true,
                "NONE" => {}
                _ => return None,
            }
        }
        Some(out)
    }

    pub fn as_sql(&self) -> String {
        match (self.table, self.file) {
            (true, true) => "FILE,TABLE".into(),
            (true, false) => "TABLE".into(),
            (false, true) => "FILE".into(),
            (false, false) => "NONE".into(),
        }
    }
}

#[derive(Debug)]
struct GeneralLog {
    enabled: bool,
    output: LogOutput,
    next_seq: u64,
    rows: VecDeque<LogRecord>,
}

/// Server-global state shared by every connection of the fixture server.
#[derive(Clone)]
pub struct Store {
    log: Arc<Mutex<GeneralLog>>,
    server_version: Arc<str>,
}

impl Store {
    pub fn new(server_version: &str) -> Self {
        Self {
            log: Arc::new(Mutex::new(GeneralLog {
                enabled: false,
                // MySQL's compiled-in default.
                output: LogOutput {
                    table: false,
                    file: true,
                },
                next_seq: 1,
                rows: VecDeque::new(),
            })),
            server_version: server_version.into(),
        }
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn general_log_enabled(&self) -> bool {
        self.log.lock().enabled
    }

    pub fn set_general_log(&self, enabled: bool) {
        self.log.lock().enabled = enabled;
    }

    pub fn log_output(&self) -> LogOutput {
        self.log.lock().output
    }

    pub fn set_log_output(&self, output: LogOutput) {
        self.log.lock().output = output;
    }

    /// Records one command if the general log is on.
    pub fn record(
        &self,
        thread_id: u32,
        user_host: &str,
        command_type: CommandType,
        argument: &str,
    ) {
        let mut log = self.log.lock();
        if !log.enabled {
            return;
        }
        if log.output.file {
            info!(
                target: "general_log",
                thread_id,
                command = command_type.as_str(),
                "{argument}"
            );
        }
        if !log.output.table {
            return;
        }

        let seq = log.next_seq;
        log.next_seq += 1;
        log.rows.push_back(LogRecord {
            seq,
            event_time: Utc::now(),
            user_host: user_host.to_string(),
            thread_id,
            command_type,
            argument: argument.to_string(),
        });
        while log.rows.len() > MAX_LOG_ROWS {
            log.rows.pop_front();
        }
    }

    /// Rows matching `thread_id` (all threads if `None`), newest first unless
    /// `ascending`, capped at `limit`.
    pub fn select(
        &self,
        thread_id: Option<u32>,
        ascending: bool,
        limit: Option<usize>,
    ) -> Vec<LogRecord> {
        let log = self.log.lock();
        let matches = |r: &&LogRecord| thread_id.map_or(true, |t| r.thread_id == t);
        let limit = limit.unwrap_or(usize::MAX);
        if ascending {
            log.rows.iter().filter(matches).take(limit).cloned().collect()
        } else {
            log.rows
                .iter()
                .rev()
                .filter(matches)
                .take(limit)
                .cloned()
                .collect()
        }
    }

    pub fn truncate(&self) -> u64 {
        let mut log = self.log.lock();
        let n = log.rows.len() as u64;
        log.rows.clear();
        n
    }
}
