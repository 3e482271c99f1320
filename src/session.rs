use crate::error::ProbeError;
use crate::model::IsolationLevel;
use mysql::prelude::*;
use mysql::{Conn, Opts, OptsBuilder, TxOpts};
use std::time::Duration;
use tracing::debug;

/// A live database session whose driver-issued SQL is being observed.
pub trait Session {
    /// Runs a statement and discards any result.
    fn execute(&mut self, sql: &str) -> Result<(), ProbeError>;

    /// Runs a query and returns the first column of every row. NULLs are skipped.
    fn query_strings(&mut self, sql: &str) -> Result<Vec<String>, ProbeError>;

    /// Begins a transaction at `level`; the SQL this sends is what gets verified.
    fn begin_transaction(
        &mut self,
        level: IsolationLevel,
    ) -> Result<Box<dyn TransactionHandle + '_>, ProbeError>;

    fn server_thread_id(&self) -> u32;

    fn server_version(&self) -> &str;
}

pub trait TransactionHandle {
    fn commit(self: Box<Self>) -> Result<(), ProbeError>;
}

/// [`Session`] backed by a blocking `mysql` crate connection.
pub struct MysqlSession {
    conn: Conn,
    thread_id: u32,
    version: String,
}

impl MysqlSession {
    pub fn connect(url: &str) -> Result<Self, ProbeError> {
        let opts = Opts::from_url(url).map_err(|e| ProbeError::Config(e.to_string()))?;
        let opts = OptsBuilder::from_opts(opts)
            .prefer_socket(false)
            .tcp_connect_timeout(Some(Duration::from_secs(1)));
        Self::from_conn(Conn::new(opts)?)
    }

    pub fn from_conn(mut conn: Conn) -> Result<Self, ProbeError> {
        let version: Option<String> = conn.query_first("SELECT VERSION()")?;
        let thread_id = conn.connection_id();
        let version = version.unwrap_or_default();
        debug!(thread_id, %version, "session established");
        Ok(Self {
            conn,
            thread_id,
            version,
        })
    }

    pub fn into_inner(self) -> Conn {
        self.conn
    }
}

fn tx_opts(level: IsolationLevel) -> TxOpts {
    let (isolation, consistent_snapshot) = match level {
        IsolationLevel::ReadUncommitted => (mysql::IsolationLevel::ReadUncommitted, false),
        IsolationLevel::ReadCommitted => (mysql::IsolationLevel::ReadCommitted, false),
        IsolationLevel::RepeatableRead | IsolationLevel::Unspecified => {
            (mysql::IsolationLevel::RepeatableRead, false)
        }
        IsolationLevel::Serializable => (mysql::IsolationLevel::Serializable, false),
        IsolationLevel::Snapshot => (mysql::IsolationLevel::RepeatableRead, true),
    };
    TxOpts::default()
        .set_isolation_level(Some(isolation))
        .set_with_consistent_snapshot(consistent_snapshot)
}

impl Session for MysqlSession {
    fn execute(&mut self, sql: &str) -> Result<(), ProbeError> {
        self.conn.query_drop(sql)?;
        Ok(())
    }

    fn query_strings(&mut self, sql: &str) -> Result<Vec<String>, ProbeError> {
        let rows: Vec<Option<String>> = self.conn.query(sql)?;
        Ok(rows.into_iter().flatten().collect())
    }

    fn begin_transaction(
        &mut self,
        level: IsolationLevel,
    ) -> Result<Box<dyn TransactionHandle + '_>, ProbeError> {
        let tx = self.conn.start_transaction(tx_opts(level))?;
        Ok(Box::new(tx))
    }

    fn server_thread_id(&self) -> u32 {
        self.thread_id
    }

    fn server_version(&self) -> &str {
        &self.version
    }
}

impl TransactionHandle for mysql::Transaction<'_> {
    fn commit(self: Box<Self>) -> Result<(), ProbeError> {
        mysql::Transaction::commit(*self)?;
        Ok(())
    }
}

impl<S: Session + ?Sized> Session for &mut S {
    fn execute(&mut self, sql: &str) -> Result<(), ProbeError> {
        (**self).execute(sql)
    }

    fn query_strings(&mut self, sql: &str) -> Result<Vec<String>, ProbeError> {
        (**self).query_strings(sql)
    }

    fn begin_transaction(
        &mut self,
        level: IsolationLevel,
    ) -> Result<Box<dyn TransactionHandle + '_>, ProbeError> {
        (**self).begin_transaction(level)
    }

    fn server_thread_id(&self) -> u32 {
        (**self).server_thread_id()
    }

    fn server_version(&self) -> &str {
        (**self).server_version()
    }
}
