//! Checks which SQL a MySQL driver sends when asked for a transaction
//! isolation level, by reading the server's general query log.
//!
//! The [`verify`] module holds the verification protocol, [`session`] the
//! seam to a live connection. The remaining modules implement a small
//! MySQL-protocol server that records a general log, used to exercise the
//! protocol without a real MySQL install.

pub mod auth;
pub mod backend;
pub mod error;
pub mod expect;
pub mod model;
pub mod session;
pub mod sql;
pub mod store;
pub mod verify;
pub mod version;

pub use error::ProbeError;
pub use model::{IsolationLevel, Observation, ProbeKind, ServerEra};
pub use session::{MysqlSession, Session, TransactionHandle};
pub use verify::{IsolationVerifier, DEFAULT_WINDOW};
pub use version::{is_legacy_server, ServerVersion};
