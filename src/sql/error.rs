//! Statement execution errors.

use thiserror::Error;

use crate::engine::StorageError;

/// Errors raised while interpreting and executing one script line.
///
/// Every variant is turned into an `'M'` reply; none of them ends the
/// connection or the server.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Unknown statement, missing keyword or malformed clause. The detail
    /// is only logged; clients see the generic text.
    #[error("Script error")]
    Script(String),

    /// The connection has not completed a login.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The session's identity lacks the required right.
    #[error("permission denied")]
    Denied,

    /// A table statement ran with no database open.
    #[error("no database is open")]
    NoDatabaseOpen,

    /// DROP DATABASE named something other than the open database.
    #[error("database {0} is not the open database")]
    NotOpenDatabase(String),

    /// A client tried to create or reach the system database.
    #[error("database name {0} is reserved")]
    ReservedName(String),

    #[error("account {0} already exists")]
    AccountExists(String),

    #[error("account {0} does not exist")]
    AccountNotFound(String),

    /// Username or password that does not fit its 64-byte column.
    #[error("{field} must be 1 to {limit} bytes")]
    InvalidCredential { field: &'static str, limit: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ExecError {
    pub(crate) fn script(detail: impl Into<String>) -> Self {
        ExecError::Script(detail.into())
    }
}
