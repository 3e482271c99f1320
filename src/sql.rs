use crate::error::ProbeError;
use crate::model::{Cell, CommandType, LogRecord};
use crate::store::{LogOutput, Store};
use opensrv_mysql::{Column, ColumnFlags, ColumnType};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

pub const VERSION_COMMENT: &str = "isolation-probe log fixture";

#[derive(Debug, Clone)]
pub struct SessionState {
    pub conn_id: u32,
    pub username: String,
    pub current_db: Option<String>,
    pub autocommit: bool,
    pub transaction_isolation: String,
    pub transaction_read_only: bool,
    vars: BTreeMap<String, String>,
    next_txn: NextTransaction,
    txn: Option<ActiveTransaction>,
}

/// Characteristics set by `SET TRANSACTION` without a scope; they apply to
/// the next transaction only.
#[derive(Debug, Clone, Default)]
struct NextTransaction {
    isolation: Option<String>,
    read_only: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ActiveTransaction {
    pub isolation: String,
    pub read_only: bool,
    pub consistent_snapshot: bool,
}

impl SessionState {
    pub fn new(conn_id: u32) -> Self {
        Self {
            conn_id,
            username: "".into(),
            current_db: None,
            autocommit: true,
            transaction_isolation: "REPEATABLE-READ".into(),
            transaction_read_only: false,
            vars: BTreeMap::new(),
            next_txn: NextTransaction::default(),
            txn: None,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn transaction(&self) -> Option<&ActiveTransaction> {
        self.txn.as_ref()
    }

    /// `user_host` column value, in the server's `user[user] @ host []` form.
    pub fn user_host(&self) -> String {
        format!("{0}[{0}] @ localhost []", self.username)
    }
}

#[derive(Debug)]
pub enum ExecOutput {
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
        info: String,
    },
    ResultSet {
        columns: Vec<Column>,
        rows: Vec<Vec<Cell>>,
    },
}

fn ok() -> Result<ExecOutput, ProbeError> {
    Ok(ExecOutput::Ok {
        affected_rows: 0,
        last_insert_id: 0,
        info: "".into(),
    })
}

fn column(name: &str, coltype: ColumnType) -> Column {
    Column {
        table: "".into(),
        column: name.to_string(),
        coltype,
        colflags: ColumnFlags::empty(),
    }
}

fn coltype_of(cell: &Cell) -> ColumnType {
    match cell {
        Cell::Int(_) => ColumnType::MYSQL_TYPE_LONGLONG,
        _ => ColumnType::MYSQL_TYPE_VAR_STRING,
    }
}

fn strip_trailing_semicolon(s: &str) -> &str {
    let s = s.trim();
    if let Some(stripped) = s.strip_suffix(';') {
        stripped.trim_end()
    } else {
        s
    }
}

fn strip_leading_comments(mut s: &str) -> &str {
    loop {
        s = s.trim_start();
        if let Some(rest) = s.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => s = &rest[end + 2..],
                None => return "",
            }
        } else if s.starts_with("-- ") || s.starts_with('#') {
            match s.find('\n') {
                Some(end) => s = &s[end + 1..],
                None => return "",
            }
        } else {
            return s;
        }
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    for q in ['\'', '"', '`'] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return &v[1..v.len() - 1];
        }
    }
    v
}

fn parse_bool(value: &str) -> Result<bool, ProbeError> {
    let v = unquote(value);
    if v == "1" || v.eq_ignore_ascii_case("on") || v.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if v == "0" || v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ProbeError::Invalid(format!("invalid boolean value: {v}")))
    }
}

/// `read committed` / `'READ-COMMITTED'` to `READ-COMMITTED`.
fn normalize_isolation(value: &str) -> Result<String, ProbeError> {
    let t = unquote(value)
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_ascii_uppercase();
    match t.as_str() {
        "READ-UNCOMMITTED" | "READ-COMMITTED" | "REPEATABLE-READ" | "SERIALIZABLE" => Ok(t),
        other => Err(ProbeError::Invalid(format!(
            "unsupported transaction isolation level: {other}"
        ))),
    }
}

/// Splits on commas outside parentheses and quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut last = 0;
    for (i, ch) in s.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                out.push(s[last..i].trim());
                last = i + 1;
            }
            _ => {}
        }
    }
    out.push(s[last..].trim());
    out
}

type Handler = fn(&str, &Store, &mut SessionState) -> Option<Result<ExecOutput, ProbeError>>;

/// Records `raw_query` in the general log, then runs it.
pub fn execute(
    raw_query: &str,
    store: &Store,
    session: &mut SessionState,
) -> Result<ExecOutput, ProbeError> {
    store.record(
        session.conn_id,
        &session.user_host(),
        CommandType::Query,
        raw_query,
    );
    execute_statement(raw_query, store, session)
}

pub fn execute_statement(
    raw_query: &str,
    store: &Store,
    session: &mut SessionState,
) -> Result<ExecOutput, ProbeError> {
    let q = strip_trailing_semicolon(strip_leading_comments(raw_query));
    if q.is_empty() {
        return ok();
    }

    let handlers: [Handler; 10] = [
        try_handle_set_global,
        try_handle_set_transaction,
        try_handle_set_names,
        try_handle_set_session,
        try_handle_transaction_control,
        try_handle_select_sysvar,
        try_handle_select_function,
        try_handle_select_general_log,
        try_handle_truncate_general_log,
        try_handle_delete_or_use,
    ];
    for handler in handlers {
        if let Some(out) = handler(q, store, session) {
            return out;
        }
    }

    Err(ProbeError::NotSupported(format!(
        "statement not understood by the log fixture: {q}"
    )))
}

fn try_handle_set_global(
    q: &str,
    store: &Store,
    _session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)^set\s+(?:global\s+|@@global\.)([a-z_][a-z0-9_]*)\s*=\s*(.+)$")
            .expect("valid set global regex")
    });
    let caps = re.captures(q)?;
    let name = caps[1].to_ascii_lowercase();
    let value = caps[2].trim();

    let res = match name.as_str() {
        "general_log" => parse_bool(value).map(|on| {
            store.set_general_log(on);
            debug!(general_log = on, "general log toggled");
        }),
        "log_output" => match LogOutput::parse(unquote(value)) {
            Some(output) => {
                store.set_log_output(output);
                Ok(())
            }
            None => Err(ProbeError::Invalid(format!(
                "Variable 'log_output' can't be set to the value of '{}'",
                unquote(value)
            ))),
        },
        other => Err(ProbeError::UnknownSystemVariable(other.to_string())),
    };
    Some(res.and_then(|_| ok()))
}

fn try_handle_set_transaction(
    q: &str,
    _store: &Store,
    session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)^set\s+(?:(session|local|global)\s+)?transaction\s+(.+)$")
            .expect("valid set transaction regex")
    });
    let caps = re.captures(q)?;
    let scope = caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
    let body = caps.get(2).map_or("", |m| m.as_str());

    Some(apply_transaction_characteristics(
        scope.as_deref(),
        body,
        session,
    ))
}

fn apply_transaction_characteristics(
    scope: Option<&str>,
    body: &str,
    session: &mut SessionState,
) -> Result<ExecOutput, ProbeError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let iso_re = RE.get_or_init(|| {
        Regex::new(r"(?is)^isolation\s+level\s+(.+)$").expect("valid isolation level regex")
    });

    if scope.is_none() && session.in_transaction() {
        return Err(ProbeError::Invalid(
            "Transaction characteristics can't be changed while a transaction is in progress"
                .into(),
        ));
    }

    let mut isolation = None;
    let mut read_only = None;
    for part in split_top_level(body) {
        let norm = normalize_ws(part);
        if let Some(caps) = iso_re.captures(&norm) {
            isolation = Some(normalize_isolation(&caps[1])?);
        } else if norm == "read only" {
            read_only = Some(true);
        } else if norm == "read write" {
            read_only = Some(false);
        } else {
            return Err(ProbeError::Parse(format!(
                "unknown transaction characteristic: {part}"
            )));
        }
    }

    match scope {
        None => {
            if isolation.is_some() {
                session.next_txn.isolation = isolation;
            }
            if read_only.is_some() {
                session.next_txn.read_only = read_only;
            }
        }
        Some("global") => {
            debug!(?isolation, ?read_only, "ignoring global transaction defaults");
        }
        Some(_) => {
            if let Some(iso) = isolation {
                session.transaction_isolation = iso;
            }
            if let Some(ro) = read_only {
                session.transaction_read_only = ro;
            }
        }
    }
    ok()
}

fn try_handle_set_names(
    q: &str,
    _store: &Store,
    session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)^set\s+names\s+(\S+)(?:\s+collate\s+(\S+))?$")
            .expect("valid set names regex")
    });
    let caps = re.captures(q)?;
    let charset = unquote(&caps[1]).to_string();
    for var in [
        "character_set_client",
        "character_set_connection",
        "character_set_results",
    ] {
        session.vars.insert(var.into(), charset.clone());
    }
    if let Some(collation) = caps.get(2) {
        session
            .vars
            .insert("collation_connection".into(), unquote(collation.as_str()).into());
    }
    Some(ok())
}

fn try_handle_set_session(
    q: &str,
    _store: &Store,
    session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?is)^set\s+(?:session\s+|local\s+|@@session\.|@@local\.|@@)?([a-z_][a-z0-9_]*)\s*=\s*(.+)$",
        )
        .expect("valid set session regex")
    });
    let caps = re.captures(q)?;
    let name = caps[1].to_ascii_lowercase();
    let value = caps[2].trim();

    let res = match name.as_str() {
        "autocommit" => parse_bool(value).map(|on| {
            // Enabling autocommit commits any open transaction.
            if on && !session.autocommit {
                session.txn = None;
            }
            session.autocommit = on;
        }),
        "transaction_isolation" | "tx_isolation" => {
            normalize_isolation(value).map(|iso| session.transaction_isolation = iso)
        }
        "transaction_read_only" | "tx_read_only" => {
            parse_bool(value).map(|ro| session.transaction_read_only = ro)
        }
        "general_log" | "log_output" => Err(ProbeError::Invalid(format!(
            "Variable '{name}' is a GLOBAL variable and should be set with SET GLOBAL"
        ))),
        _ => {
            session.vars.insert(name, unquote(value).to_string());
            Ok(())
        }
    };
    Some(res.and_then(|_| ok()))
}

fn try_handle_transaction_control(
    q: &str,
    _store: &Store,
    session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    let norm = normalize_ws(q);

    if let Some(rest) = norm.strip_prefix("start transaction") {
        if !rest.is_empty() && !rest.starts_with(' ') {
            return None;
        }
        let mut consistent_snapshot = false;
        let mut read_only = None;
        let rest = rest.trim();
        if !rest.is_empty() {
            for part in split_top_level(rest) {
                match part {
                    "with consistent snapshot" => consistent_snapshot = true,
                    "read only" => read_only = Some(true),
                    "read write" => read_only = Some(false),
                    other => {
                        return Some(Err(ProbeError::Parse(format!(
                            "unknown START TRANSACTION characteristic: {other}"
                        ))))
                    }
                }
            }
        }
        begin(session, consistent_snapshot, read_only);
        return Some(ok());
    }

    match norm.as_str() {
        "begin" | "begin work" => {
            begin(session, false, None);
            Some(ok())
        }
        "commit" | "commit work" | "rollback" | "rollback work" => {
            if let Some(txn) = session.txn.take() {
                debug!(conn_id = session.conn_id, isolation = %txn.isolation, "{norm}");
            }
            Some(ok())
        }
        _ => None,
    }
}

fn begin(session: &mut SessionState, consistent_snapshot: bool, read_only: Option<bool>) {
    if session.txn.is_some() {
        debug!(conn_id = session.conn_id, "implicit commit");
    }
    let next = std::mem::take(&mut session.next_txn);
    let txn = ActiveTransaction {
        isolation: next
            .isolation
            .unwrap_or_else(|| session.transaction_isolation.clone()),
        read_only: read_only
            .or(next.read_only)
            .unwrap_or(session.transaction_read_only),
        consistent_snapshot,
    };
    debug!(
        conn_id = session.conn_id,
        isolation = %txn.isolation,
        consistent_snapshot,
        "transaction started"
    );
    session.txn = Some(txn);
}

fn sysvar_value(store: &Store, session: &SessionState, name: &str) -> Option<Cell> {
    let name = name.trim().to_ascii_lowercase();
    let flag = |b: bool| Cell::Int(if b { 1 } else { 0 });
    match name.as_str() {
        "autocommit" => Some(flag(session.autocommit)),
        "version" => Some(Cell::Text(store.server_version().to_string())),
        "version_comment" => Some(Cell::Text(VERSION_COMMENT.to_string())),
        "transaction_isolation" | "tx_isolation" => {
            Some(Cell::Text(session.transaction_isolation.clone()))
        }
        "transaction_read_only" | "tx_read_only" => Some(flag(session.transaction_read_only)),
        "general_log" => Some(flag(store.general_log_enabled())),
        "log_output" => Some(Cell::Text(store.log_output().as_sql())),
        "lower_case_table_names" => Some(Cell::Int(0)),
        "max_allowed_packet" => Some(Cell::Int(64 * 1024 * 1024)),
        "wait_timeout" => Some(Cell::Int(28800)),
        "socket" => Some(Cell::Null),
        other => session.vars.get(other).map(|v| Cell::Text(v.clone())),
    }
}

fn try_handle_select_sysvar(
    q: &str,
    store: &Store,
    session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static SELECT_RE: OnceLock<Regex> = OnceLock::new();
    static ITEM_RE: OnceLock<Regex> = OnceLock::new();
    let select_re = SELECT_RE.get_or_init(|| {
        Regex::new(r"(?is)^select\s+(@@.+?)(?:\s+limit\s+\d+)?$").expect("valid sysvar select regex")
    });
    let item_re = ITEM_RE.get_or_init(|| {
        Regex::new(
            r#"(?is)^@@(?:(session|global)\.)?([a-z0-9_]+)(?:\s+(?:as\s+)?([a-z0-9_`"']+))?$"#,
        )
        .expect("valid sysvar item regex")
    });
    let caps = select_re.captures(q)?;

    let mut columns = Vec::new();
    let mut row = Vec::new();
    for item in split_top_level(caps.get(1).map_or("", |m| m.as_str())) {
        let Some(item_caps) = item_re.captures(item) else {
            return Some(Err(ProbeError::Parse(format!(
                "unsupported select item: {item}"
            ))));
        };
        let scope = item_caps.get(1).map(|m| m.as_str().to_ascii_lowercase());
        let var_name = item_caps.get(2).map_or("", |m| m.as_str());
        let col_name = match (item_caps.get(3), scope) {
            (Some(alias), _) => unquote(alias.as_str()).to_string(),
            (None, Some(scope)) => format!("@@{scope}.{var_name}"),
            (None, None) => format!("@@{var_name}"),
        };
        let Some(value) = sysvar_value(store, session, var_name) else {
            return Some(Err(ProbeError::UnknownSystemVariable(var_name.to_string())));
        };
        columns.push(column(&col_name, coltype_of(&value)));
        row.push(value);
    }

    Some(Ok(ExecOutput::ResultSet {
        columns,
        rows: vec![row],
    }))
}

fn try_handle_select_function(
    q: &str,
    store: &Store,
    session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r#"(?is)^select\s+((version|connection_id|database|schema|user|current_user)\s*\(\s*\))(?:\s+(?:as\s+)?([a-z0-9_`"']+))?$"#,
        )
        .expect("valid function select regex")
    });
    let caps = re.captures(q)?;
    let func = caps[2].to_ascii_lowercase();
    let col_name = caps
        .get(3)
        .map(|m| unquote(m.as_str()).to_string())
        .unwrap_or_else(|| caps[1].to_string());

    let value = match func.as_str() {
        "version" => Cell::Text(store.server_version().to_string()),
        "connection_id" => Cell::Int(session.conn_id as i64),
        "database" | "schema" => session
            .current_db
            .clone()
            .map_or(Cell::Null, Cell::Text),
        _ => Cell::Text(format!("{}@localhost", session.username)),
    };

    Some(Ok(ExecOutput::ResultSet {
        columns: vec![column(&col_name, coltype_of(&value))],
        rows: vec![vec![value]],
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogColumn {
    EventTime,
    UserHost,
    ThreadId,
    ServerId,
    CommandType,
    Argument,
}

impl LogColumn {
    const ALL: [(LogColumn, &'static str); 6] = [
        (LogColumn::EventTime, "event_time"),
        (LogColumn::UserHost, "user_host"),
        (LogColumn::ThreadId, "thread_id"),
        (LogColumn::ServerId, "server_id"),
        (LogColumn::CommandType, "command_type"),
        (LogColumn::Argument, "argument"),
    ];

    fn parse(expr: &str) -> Option<LogColumn> {
        static CONVERT_RE: OnceLock<Regex> = OnceLock::new();
        let convert_re = CONVERT_RE.get_or_init(|| {
            Regex::new(r"(?is)^convert\s*\(\s*argument\s*(?:using\s+[a-z0-9_]+|,\s*char(?:\s*\(\d+\))?)\s*\)$")
                .expect("valid convert regex")
        });
        if convert_re.is_match(expr) {
            return Some(LogColumn::Argument);
        }
        let name = unquote(expr).to_ascii_lowercase();
        Self::ALL
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(c, _)| *c)
    }

    fn cell(&self, record: &LogRecord) -> Cell {
        match self {
            LogColumn::EventTime => Cell::Text(
                record
                    .event_time
                    .format("%Y-%m-%d %H:%M:%S%.6f")
                    .to_string(),
            ),
            LogColumn::UserHost => Cell::Text(record.user_host.clone()),
            LogColumn::ThreadId => Cell::Int(record.thread_id as i64),
            LogColumn::ServerId => Cell::Int(1),
            LogColumn::CommandType => Cell::Text(record.command_type.as_str().to_string()),
            LogColumn::Argument => Cell::Text(record.argument.clone()),
        }
    }

    fn coltype(&self) -> ColumnType {
        match self {
            LogColumn::ThreadId | LogColumn::ServerId => ColumnType::MYSQL_TYPE_LONGLONG,
            _ => ColumnType::MYSQL_TYPE_VAR_STRING,
        }
    }
}

fn try_handle_select_general_log(
    q: &str,
    store: &Store,
    _session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?is)^select\s+(?P<cols>.+?)\s+from\s+`?mysql`?\.`?general_log`?(?:\s+where\s+thread_id\s*=\s*(?P<tid>\d+))?(?:\s+order\s+by\s+event_time(?:\s+(?P<dir>asc|desc))?)?(?:\s+limit\s+(?P<limit>\d+))?$",
        )
        .expect("valid general_log select regex")
    });
    let caps = re.captures(q)?;

    let mut columns: Vec<(String, LogColumn)> = Vec::new();
    for expr in split_top_level(caps.name("cols").map_or("", |m| m.as_str())) {
        if expr == "*" {
            columns.extend(LogColumn::ALL.iter().map(|(c, n)| (n.to_string(), *c)));
            continue;
        }
        match LogColumn::parse(expr) {
            Some(c) => columns.push((expr.to_string(), c)),
            None => {
                return Some(Err(ProbeError::NotSupported(format!(
                    "general_log column expression: {expr}"
                ))))
            }
        }
    }

    let parse_num = |name: &str| -> Result<Option<u64>, ProbeError> {
        caps.name(name)
            .map(|m| {
                m.as_str()
                    .parse::<u64>()
                    .map_err(|_| ProbeError::Parse(format!("invalid {name}: {}", m.as_str())))
            })
            .transpose()
    };
    let thread_id = match parse_num("tid") {
        Ok(t) => t.map(|t| u32::try_from(t).unwrap_or(u32::MAX)),
        Err(e) => return Some(Err(e)),
    };
    let limit = match parse_num("limit") {
        Ok(l) => l.map(|l| usize::try_from(l).unwrap_or(usize::MAX)),
        Err(e) => return Some(Err(e)),
    };
    // Insertion order unless descending is requested.
    let ascending = !caps
        .name("dir")
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("desc"));

    let rows: Vec<Vec<Cell>> = store
        .select(thread_id, ascending, limit)
        .iter()
        .map(|r| columns.iter().map(|(_, c)| c.cell(r)).collect())
        .collect();

    Some(Ok(ExecOutput::ResultSet {
        columns: columns
            .iter()
            .map(|(name, c)| column(name, c.coltype()))
            .collect(),
        rows,
    }))
}

fn try_handle_truncate_general_log(
    q: &str,
    store: &Store,
    _session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?is)^truncate\s+(?:table\s+)?`?mysql`?\.`?general_log`?$")
            .expect("valid truncate regex")
    });
    if !re.is_match(q) {
        return None;
    }
    let removed = store.truncate();
    debug!(removed, "general log truncated");
    Some(ok())
}

/// `DELETE FROM t` and `USE db` succeed without touching any data; the fixture
/// keeps no user tables.
fn try_handle_delete_or_use(
    q: &str,
    _store: &Store,
    session: &mut SessionState,
) -> Option<Result<ExecOutput, ProbeError>> {
    static DELETE_RE: OnceLock<Regex> = OnceLock::new();
    static USE_RE: OnceLock<Regex> = OnceLock::new();
    let delete_re = DELETE_RE.get_or_init(|| {
        Regex::new(r"(?is)^delete\s+from\s+([`\w.]+)(?:\s+where\s+.+)?$")
            .expect("valid delete regex")
    });
    let use_re =
        USE_RE.get_or_init(|| Regex::new(r"(?is)^use\s+(\S+)$").expect("valid use regex"));

    if let Some(caps) = delete_re.captures(q) {
        let table = caps[1].replace('`', "").to_ascii_lowercase();
        if table == "mysql.general_log" {
            return Some(Err(ProbeError::NotSupported(
                "DELETE on the general log; use TRUNCATE".into(),
            )));
        }
        return Some(ok());
    }
    if let Some(caps) = use_re.captures(q) {
        session.current_db = Some(unquote(&caps[1]).to_string());
        return Some(ok());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Store, SessionState) {
        let store = Store::new("8.0.30-test");
        let mut session = SessionState::new(3);
        session.username = "root".into();
        (store, session)
    }

    fn run(store: &Store, session: &mut SessionState, q: &str) -> ExecOutput {
        match execute(q, store, session) {
            Ok(out) => out,
            Err(e) => panic!("failed to run {q}: {e:?}"),
        }
    }

    fn texts(out: ExecOutput) -> Vec<String> {
        match out {
            ExecOutput::ResultSet { rows, .. } => rows
                .into_iter()
                .map(|r| r[0].as_text().unwrap_or_default().to_string())
                .collect(),
            other => panic!("expected result set, got {other:?}"),
        }
    }

    #[test]
    fn logs_driver_transaction_newest_first() {
        let (store, mut session) = setup();
        run(&store, &mut session, "set global log_output = 'table';");
        run(&store, &mut session, "set global general_log = 1;");
        run(&store, &mut session, "SET TRANSACTION ISOLATION LEVEL READ COMMITTED");
        run(&store, &mut session, "START TRANSACTION");
        assert_eq!(
            session.transaction().map(|t| t.isolation.as_str()),
            Some("READ-COMMITTED")
        );
        run(&store, &mut session, "COMMIT");
        assert!(!session.in_transaction());
        run(&store, &mut session, "set global general_log = 0;");

        let out = run(
            &store,
            &mut session,
            "select convert(argument USING utf8) from mysql.general_log where thread_id = 3 order by event_time desc limit 10;",
        );
        assert_eq!(
            texts(out),
            vec![
                "set global general_log = 0;",
                "COMMIT",
                "START TRANSACTION",
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            ]
        );
    }

    #[test]
    fn next_transaction_characteristics_are_one_shot() {
        let (store, mut session) = setup();
        run(&store, &mut session, "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE");
        run(&store, &mut session, "START TRANSACTION WITH CONSISTENT SNAPSHOT");
        let txn = session.transaction().unwrap();
        assert_eq!(txn.isolation, "SERIALIZABLE");
        assert!(txn.consistent_snapshot);

        let err = execute("SET TRANSACTION READ ONLY", &store, &mut session).unwrap_err();
        assert!(matches!(err, ProbeError::Invalid(_)));

        run(&store, &mut session, "COMMIT");
        run(&store, &mut session, "BEGIN");
        assert_eq!(session.transaction().unwrap().isolation, "REPEATABLE-READ");
        run(&store, &mut session, "ROLLBACK");

        run(
            &store,
            &mut session,
            "SET SESSION TRANSACTION ISOLATION LEVEL READ UNCOMMITTED, READ ONLY",
        );
        assert_eq!(session.transaction_isolation, "READ-UNCOMMITTED");
        assert!(session.transaction_read_only);
        run(&store, &mut session, "set @@transaction_isolation = 'read-committed'");
        assert_eq!(session.transaction_isolation, "READ-COMMITTED");
    }

    #[test]
    fn log_is_filtered_by_thread_and_limited() {
        let (store, mut a) = setup();
        let mut b = SessionState::new(4);
        b.username = "root".into();
        run(&store, &mut a, "SET GLOBAL log_output = 'TABLE'");
        run(&store, &mut a, "SET @@global.general_log = ON");
        for i in 0..4 {
            run(&store, &mut a, &format!("set sql_mode = 'm{i}'"));
            run(&store, &mut b, "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE");
        }
        let out = run(
            &store,
            &mut a,
            "SELECT argument FROM mysql.general_log WHERE thread_id = 3 ORDER BY event_time DESC LIMIT 2",
        );
        let rows = texts(out);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("SELECT argument"));
        assert_eq!(rows[1], "set sql_mode = 'm3'");

        let out = run(
            &store,
            &mut a,
            "select thread_id, command_type from mysql.general_log where thread_id = 4",
        );
        match out {
            ExecOutput::ResultSet { columns, rows } => {
                assert_eq!(columns[0].column, "thread_id");
                assert_eq!(rows.len(), 4);
                assert_eq!(rows[0][0], Cell::Int(4));
                assert_eq!(rows[0][1], Cell::Text("Query".into()));
            }
            other => panic!("expected result set, got {other:?}"),
        }

        run(&store, &mut a, "SET GLOBAL general_log = 0");
        run(&store, &mut a, "TRUNCATE TABLE mysql.general_log");
        let out = run(&store, &mut a, "select * from mysql.general_log");
        assert!(texts(out).is_empty());
    }

    #[test]
    fn nothing_logged_to_table_with_file_output() {
        let (store, mut session) = setup();
        run(&store, &mut session, "set global general_log = 1");
        run(&store, &mut session, "START TRANSACTION");
        run(&store, &mut session, "set global general_log = 0");
        let out = run(&store, &mut session, "select argument from mysql.general_log");
        assert!(texts(out).is_empty());
    }

    #[test]
    fn sysvars_and_functions() {
        let (store, mut session) = setup();
        let out = run(
            &store,
            &mut session,
            "SELECT @@max_allowed_packet, @@wait_timeout",
        );
        match out {
            ExecOutput::ResultSet { columns, rows } => {
                assert_eq!(columns.len(), 2);
                assert_eq!(columns[0].column, "@@max_allowed_packet");
                assert_eq!(rows[0][1], Cell::Int(28800));
            }
            other => panic!("expected result set, got {other:?}"),
        }

        assert_eq!(
            texts(run(&store, &mut session, "SELECT VERSION()")),
            vec!["8.0.30-test"]
        );
        assert_eq!(
            texts(run(&store, &mut session, "select @@session.transaction_isolation")),
            vec!["REPEATABLE-READ"]
        );
        match run(&store, &mut session, "select connection_id() as id") {
            ExecOutput::ResultSet { columns, rows } => {
                assert_eq!(columns[0].column, "id");
                assert_eq!(rows[0][0], Cell::Int(3));
            }
            other => panic!("expected result set, got {other:?}"),
        }

        let err = execute("select @@no_such_var", &store, &mut session).unwrap_err();
        assert!(matches!(err, ProbeError::UnknownSystemVariable(_)));
    }

    #[test]
    fn rejects_unknown_statements_and_bad_values() {
        let (store, mut session) = setup();
        assert!(matches!(
            execute("SELECT * FROM t", &store, &mut session),
            Err(ProbeError::NotSupported(_))
        ));
        assert!(matches!(
            execute("SET GLOBAL log_output = 'SOCKET'", &store, &mut session),
            Err(ProbeError::Invalid(_))
        ));
        assert!(matches!(
            execute("SET general_log = 1", &store, &mut session),
            Err(ProbeError::Invalid(_))
        ));
        assert!(matches!(
            execute("SET TRANSACTION ISOLATION LEVEL SNAPSHOT", &store, &mut session),
            Err(ProbeError::Invalid(_))
        ));
        assert!(matches!(
            execute("DELETE FROM mysql.general_log", &store, &mut session),
            Err(ProbeError::NotSupported(_))
        ));
        run(&store, &mut session, "delete from transactions_test");
        run(&store, &mut session, "/* reset */ delete from transactions_test where id > 0;");
    }
}
