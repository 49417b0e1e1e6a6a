use crate::engine::{Catalog, StorageError};
use crate::session::{Identity, Session};

use super::error::ExecError;

/// A right a statement needs before it may touch storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<'a> {
    /// CREATE USER and GRANT PERMISSION
    ManageAccounts,
    CreateDatabase,
    /// USE of a registered database
    OpenDatabase { database_id: i32 },
    /// Every table statement: runs against the open database, which must
    /// still be the registration `USE` opened
    UseOpenDatabase,
    /// DROP DATABASE of the named (already lowercased) database
    DropDatabase { name: &'a str },
}

/// Decides whether `session` may exercise `capability`.
///
/// ## Rules
/// ```text
/// ManageAccounts    root only
/// CreateDatabase    any authenticated identity
/// OpenDatabase      root, or an account with a database_permission row
/// UseOpenDatabase   a database is open and still registered under its id
/// DropDatabase      the named database is the open one, same check
/// ```
///
/// ## Returns
/// * `Ok(())` - allowed
/// * `Err(NotAuthenticated | Denied | NoDatabaseOpen | NotOpenDatabase)`
/// * `Err(Storage(DatabaseNotFound))` - the open database was dropped since `USE`
/// * `Err(Storage(_))` - a system table could not be read
pub fn authorize(
    session: &Session,
    catalog: &Catalog<'_>,
    capability: Capability<'_>,
) -> Result<(), ExecError> {
    let identity = session.identity().ok_or(ExecError::NotAuthenticated)?;
    match capability {
        Capability::ManageAccounts => match identity {
            Identity::Root => Ok(()),
            Identity::Account(_) => Err(ExecError::Denied),
        },
        Capability::CreateDatabase => Ok(()),
        Capability::OpenDatabase { database_id } => match identity {
            Identity::Root => Ok(()),
            Identity::Account(account_id) => {
                if catalog.has_permission(account_id, database_id)? {
                    Ok(())
                } else {
                    Err(ExecError::Denied)
                }
            }
        },
        Capability::UseOpenDatabase => still_registered(session, catalog),
        Capability::DropDatabase { name } => match session.open_database() {
            Some(open) if open.eq_ignore_ascii_case(name) => still_registered(session, catalog),
            Some(_) => Err(ExecError::NotOpenDatabase(name.to_string())),
            None => Err(ExecError::NoDatabaseOpen),
        },
    }
}

fn still_registered(session: &Session, catalog: &Catalog<'_>) -> Result<(), ExecError> {
    let (Some(name), Some(id)) = (session.open_database(), session.open_database_id()) else {
        return Err(ExecError::NoDatabaseOpen);
    };
    if catalog.find_database(name)? == Some(id) {
        Ok(())
    } else {
        Err(StorageError::DatabaseNotFound(name.to_string()).into())
    }
}
