use chrono::{DateTime, Utc};
use clap::ValueEnum;
use std::fmt;

/// Isolation level requested through the session API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
    Unspecified,
}

impl IsolationLevel {
    pub const ALL: [IsolationLevel; 6] = [
        IsolationLevel::ReadUncommitted,
        IsolationLevel::ReadCommitted,
        IsolationLevel::RepeatableRead,
        IsolationLevel::Serializable,
        IsolationLevel::Snapshot,
        IsolationLevel::Unspecified,
    ];

    /// Lowercase SQL name of the level the server ends up running.
    ///
    /// MySQL has no snapshot level; drivers emulate it with a repeatable
    /// read transaction started with a consistent snapshot.
    pub fn sql_name(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read uncommitted",
            IsolationLevel::ReadCommitted => "read committed",
            IsolationLevel::RepeatableRead
            | IsolationLevel::Snapshot
            | IsolationLevel::Unspecified => "repeatable read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    pub fn cli_name(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "read-uncommitted",
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
            IsolationLevel::Snapshot => "snapshot",
            IsolationLevel::Unspecified => "unspecified",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.cli_name())
    }
}

/// Which driver-issued statement a verification run inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ProbeKind {
    /// The `SET ... TRANSACTION ISOLATION LEVEL` statement.
    Isolation,
    /// The `START TRANSACTION` statement.
    Start,
}

impl ProbeKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            ProbeKind::Isolation => "isolation",
            ProbeKind::Start => "start",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.keyword())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEra {
    /// Below 5.7.
    Legacy,
    Modern,
}

impl fmt::Display for ServerEra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerEra::Legacy => f.pad("legacy"),
            ServerEra::Modern => f.pad("modern"),
        }
    }
}

/// Outcome of a successful verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub kind: ProbeKind,
    pub level: IsolationLevel,
    pub era: ServerEra,
    /// Statement as it appeared in the general log.
    pub statement: String,
    pub matched: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Connect,
    InitDb,
    Query,
    Prepare,
    Quit,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Connect => "Connect",
            CommandType::InitDb => "Init DB",
            CommandType::Query => "Query",
            CommandType::Prepare => "Prepare",
            CommandType::Quit => "Quit",
        }
    }
}

/// A row of the fixture server's `mysql.general_log` table.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Insertion order; breaks ties between rows sharing an event time.
    pub seq: u64,
    pub event_time: DateTime<Utc>,
    pub user_host: String,
    pub thread_id: u32,
    pub command_type: CommandType,
    pub argument: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Null,
    Int(i64),
    Text(String),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}
