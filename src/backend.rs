use crate::auth::Credentials;
use crate::error::ProbeError;
use crate::model::{Cell, CommandType};
use crate::sql::{execute, ExecOutput, SessionState};
use crate::store::Store;
use async_trait::async_trait;
use opensrv_mysql::{
    AsyncMysqlShim, ColumnType, ErrorKind, InitWriter, OkResponse, ParamParser,
    QueryResultWriter, StatementMetaWriter, StatusFlags,
};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tracing::debug;

/// One client connection of the log fixture server.
pub struct Backend {
    store: Store,
    credentials: Arc<Credentials>,
    session: Mutex<SessionState>,
    salt: [u8; 20],
    conn_id: u32,
}

impl Backend {
    pub fn new(store: Store, credentials: Arc<Credentials>, conn_id: u32) -> Self {
        let mut salt = [0u8; 20];
        OsRng.fill_bytes(&mut salt);
        Self {
            store,
            credentials,
            session: Mutex::new(SessionState::new(conn_id)),
            salt,
            conn_id,
        }
    }

    fn record(&self, command_type: CommandType, argument: &str) {
        let user_host = self.session.lock().user_host();
        self.store
            .record(self.conn_id, &user_host, command_type, argument);
    }

    fn status_flags(autocommit: bool, in_trans: bool) -> StatusFlags {
        let mut flags = StatusFlags::empty();
        if in_trans {
            flags.insert(StatusFlags::SERVER_STATUS_IN_TRANS);
        }
        if autocommit {
            flags.insert(StatusFlags::SERVER_STATUS_AUTOCOMMIT);
        }
        flags
    }

    fn err_to_kind(err: &ProbeError) -> ErrorKind {
        match err {
            ProbeError::Parse(_) => ErrorKind::ER_PARSE_ERROR,
            ProbeError::NotSupported(_) => ErrorKind::ER_NOT_SUPPORTED_YET,
            ProbeError::Invalid(_) => ErrorKind::ER_WRONG_VALUE_FOR_VAR,
            ProbeError::UnknownSystemVariable(_) => ErrorKind::ER_UNKNOWN_SYSTEM_VARIABLE,
            _ => ErrorKind::ER_UNKNOWN_ERROR,
        }
    }
}

#[async_trait]
impl<W> AsyncMysqlShim<W> for Backend
where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    type Error = ProbeError;

    fn version(&self) -> String {
        self.store.server_version().to_string()
    }

    fn connect_id(&self) -> u32 {
        self.conn_id
    }

    fn salt(&self) -> [u8; 20] {
        self.salt
    }

    async fn authenticate(
        &self,
        auth_plugin: &str,
        username: &[u8],
        salt: &[u8],
        auth_data: &[u8],
    ) -> bool {
        if !self.credentials.verify(auth_plugin, username, salt, auth_data) {
            debug!(conn_id = self.conn_id, "authentication failed");
            return false;
        }
        let mut session = self.session.lock();
        session.username = self.credentials.username.clone();
        self.store.record(
            self.conn_id,
            &session.user_host(),
            CommandType::Connect,
            &format!("{}@localhost on  using TCP/IP", session.username),
        );
        true
    }

    async fn on_prepare<'a>(
        &'a mut self,
        query: &'a str,
        info: StatementMetaWriter<'a, W>,
    ) -> Result<(), ProbeError> {
        self.record(CommandType::Prepare, query);
        debug!(conn_id = self.conn_id, query, "rejecting prepare");
        info.error(
            ErrorKind::ER_NOT_SUPPORTED_YET,
            b"prepared statements are not supported by the log fixture",
        )
        .await?;
        Ok(())
    }

    async fn on_execute<'a>(
        &'a mut self,
        _id: u32,
        _params: ParamParser<'a>,
        results: QueryResultWriter<'a, W>,
    ) -> Result<(), ProbeError> {
        results
            .error(ErrorKind::ER_UNKNOWN_STMT_HANDLER, b"unknown prepared statement")
            .await?;
        Ok(())
    }

    async fn on_close<'a>(&'a mut self, _stmt: u32)
    where
        W: 'async_trait,
    {
    }

    async fn on_init<'a>(
        &'a mut self,
        db: &'a str,
        writer: InitWriter<'a, W>,
    ) -> Result<(), ProbeError> {
        self.record(CommandType::InitDb, db);
        // The fixture has no catalog; any schema name is accepted.
        self.session.lock().current_db = Some(db.to_string());
        writer.ok().await?;
        Ok(())
    }

    async fn on_query<'a>(
        &'a mut self,
        query: &'a str,
        results: QueryResultWriter<'a, W>,
    ) -> Result<(), ProbeError> {
        let (out, autocommit, in_trans) = {
            let mut sess = self.session.lock();
            let out = execute(query, &self.store, &mut sess);
            (out, sess.autocommit, sess.in_transaction())
        };

        match out {
            Ok(ExecOutput::Ok {
                affected_rows,
                last_insert_id,
                info,
            }) => {
                let ok = OkResponse {
                    affected_rows,
                    last_insert_id,
                    status_flags: Self::status_flags(autocommit, in_trans),
                    info,
                    ..Default::default()
                };
                results.completed(ok).await?;
            }
            Ok(ExecOutput::ResultSet { columns, rows }) => {
                let mut rw = results.start(&columns).await?;
                for row in rows {
                    for (i, cell) in row.into_iter().enumerate() {
                        let coltype = columns
                            .get(i)
                            .map(|c| c.coltype)
                            .unwrap_or(ColumnType::MYSQL_TYPE_VAR_STRING);
                        match (coltype, cell) {
                            (_, Cell::Null) => rw.write_col(None::<u8>)?,
                            (ColumnType::MYSQL_TYPE_LONGLONG, Cell::Int(n)) => rw.write_col(n)?,
                            (_, Cell::Int(n)) => rw.write_col(n.to_string())?,
                            (_, Cell::Text(s)) => rw.write_col(s)?,
                        }
                    }
                    rw.end_row().await?;
                }
                rw.finish().await?;
            }
            Err(err) => {
                debug!(conn_id = self.conn_id, %err, query, "query rejected");
                let kind = Self::err_to_kind(&err);
                results.error(kind, err.to_string().as_bytes()).await?;
            }
        }

        Ok(())
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        let session = self.session.lock();
        if !session.username.is_empty() {
            self.store
                .record(self.conn_id, &session.user_host(), CommandType::Quit, "");
        }
    }
}
