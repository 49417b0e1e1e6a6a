//! Per-connection session state.
//!
//! A [`Session`] is created when a connection is accepted, mutated by login
//! frames and `USE` statements, and dropped with the connection. Nothing in
//! it is persisted.

use crate::engine::ROOT_ACCOUNT_ID;

/// Who a session acts as once authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// The superuser, id 0. Never stored in `admin/account`.
    Root,
    /// A regular account from `admin/account`.
    Account(i32),
}

impl Identity {
    pub fn from_account_id(id: i32) -> Self {
        if id == ROOT_ACCOUNT_ID {
            Identity::Root
        } else {
            Identity::Account(id)
        }
    }

}

/// Connection lifecycle.
///
/// ```text
/// Connected ──login frame──▶ Authenticating ──success──▶ Authenticated
///     │                            │
///     │                            └──failure──▶ Connected
///     └──"root" frame──────────────────────────▶ Authenticated(Root)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Authenticating,
    Authenticated(Identity),
}

/// The database a `USE` opened: its name and the registry id it had then.
///
/// The id pins the session to that registration, so a database dropped and
/// re-created under the same name is not reachable through an old `USE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDatabase {
    pub name: String,
    pub id: i32,
}

/// Authentication state and currently open database of one connection.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    open_database: Option<OpenDatabase>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Connected,
            open_database: None,
        }
    }

    /// A session that is already authenticated, e.g. for embedding or tests.
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            state: SessionState::Authenticated(identity),
            open_database: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<Identity> {
        match self.state {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Superuser bootstrap: no credentials are checked.
    pub fn login_root(&mut self) {
        self.state = SessionState::Authenticated(Identity::Root);
        self.open_database = None;
    }

    pub fn begin_login(&mut self) {
        self.state = SessionState::Authenticating;
        self.open_database = None;
    }

    /// Finishes a login attempt; `None` means the credentials were rejected.
    pub fn complete_login(&mut self, account_id: Option<i32>) {
        self.state = match account_id {
            Some(id) => SessionState::Authenticated(Identity::from_account_id(id)),
            None => SessionState::Connected,
        };
    }

    pub fn open_database(&self) -> Option<&str> {
        self.open_database.as_ref().map(|db| db.name.as_str())
    }

    /// Registry id of the open database, as recorded by `USE`.
    pub fn open_database_id(&self) -> Option<i32> {
        self.open_database.as_ref().map(|db| db.id)
    }

    pub fn is_database_open(&self) -> bool {
        self.open_database.is_some()
    }

    pub fn open(&mut self, name: String, id: i32) {
        self.open_database = Some(OpenDatabase { name, id });
    }

    pub fn close_database(&mut self) {
        self.open_database = None;
    }
}
