use std::path::{Path, PathBuf};

use tracing::{info, warn};

mod catalog;
mod error;
mod executor;
mod schema;
mod storage;

pub use catalog::{Account, Catalog, ADMIN_DATABASE, MAX_CREDENTIAL_LENGTH, ROOT_ACCOUNT_ID};
pub use error::{StorageError, StorageResult};
pub use executor::{execute_select_scan, ResultSet};
pub use schema::{
    identifier, unquote, Attribute, DataType, Field, FieldValue, Schema, Value,
    MAX_ATTRIBUTES, MAX_ATTRIBUTE_NAME_LENGTH, STRING_MAX_LENGTH,
};
pub use storage::{Header, Record, TableFile, ATTRIBUTE_SLOT_SIZE, HEADER_SIZE};

/// Entry point to the on-disk database tree.
///
/// The Engine owns nothing but the database root path. Every table access
/// goes through a short-lived [`TableFile`] handle, so no file descriptor
/// is cached across requests.
///
/// ## Layout
///
/// ```text
/// <root>/
/// ├── admin/                  system tables (see Catalog)
/// │   ├── account
/// │   ├── database
/// │   └── database_permission
/// └── <database>/
///     └── <table>             header + attribute slots + record slots
/// ```
#[derive(Clone, Debug)]
pub struct Engine {
    root: PathBuf,
}

impl Engine {
    /// Opens a database root, bootstrapping it on first start.
    ///
    /// If `root` does not exist it is created together with the `admin`
    /// database and its three system tables. An existing root is used as
    /// is; nothing is rewritten.
    ///
    /// ## Returns
    /// * `Ok(Engine)` - ready to serve requests
    /// * `Err(_)` - the root or the system tables could not be created
    pub fn open<P: Into<PathBuf>>(root: P) -> StorageResult<Self> {
        let root: PathBuf = root.into();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            Catalog::bootstrap(&root)?;
        }
        info!(root = %root.display(), "engine opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// System tables of this root.
    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.root)
    }

    /// Handle for `<root>/<database>/<table>`.
    pub fn table(&self, database: &str, table: &str) -> TableFile {
        TableFile::new(&self.root, database, table)
    }

    /// Creates a database directory and registers it.
    ///
    /// `register` runs once the directory exists. If it fails the directory
    /// is removed again, so a failed CREATE DATABASE leaves no orphan that
    /// would block the name later.
    ///
    /// ## Returns
    /// * `Ok(T)` - whatever `register` returned
    /// * `Err(StorageError::DatabaseExists)` - the directory already exists
    /// * `Err(_)` - the directory could not be created, or `register` failed
    pub fn create_database<T>(
        &self,
        name: &str,
        register: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        if !storage::create_database(&self.root, name)? {
            return Err(StorageError::DatabaseExists(name.to_string()));
        }
        register().map_err(|err| {
            if let Err(cleanup) = storage::remove_database(&self.root, name) {
                warn!(db = name, error = %cleanup, "could not remove unregistered database directory");
            }
            err
        })
    }

    /// Removes a database directory with all of its tables.
    pub fn remove_database(&self, name: &str) -> StorageResult<()> {
        storage::remove_database(&self.root, name)
    }
}
