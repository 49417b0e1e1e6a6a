use std::path::Path;

use tracing::info;

use super::error::{StorageError, StorageResult};
use super::schema::{Attribute, FieldValue, Schema, Value};
use super::storage::{self, TableFile};

/// Name of the database holding the system tables.
pub const ADMIN_DATABASE: &str = "admin";

/// Account id of the superuser. Root is never stored as a row.
pub const ROOT_ACCOUNT_ID: i32 = 0;

/// Width of the username and password columns of `admin/account`.
pub const MAX_CREDENTIAL_LENGTH: usize = 64;

const ACCOUNT_TABLE: &str = "account";
const DATABASE_TABLE: &str = "database";
const PERMISSION_TABLE: &str = "database_permission";

const ACCOUNT_SCHEMA: &str = "id INT, username STRING(64), password STRING(64)";
const DATABASE_SCHEMA: &str = "id INT, name STRING(64)";
const PERMISSION_SCHEMA: &str = "accountID INT, databaseID INT";

/// A row of `admin/account`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: i32,
    pub username: String,
}

/// Access to the system tables in the `admin` database.
///
/// The catalog is the data dictionary of the server: accounts, the
/// registry of user databases and the account-to-database permission rows.
/// All three are ordinary table files, read and written through
/// [`TableFile`] like any user table.
///
/// ## Tables
/// ```text
/// admin/account              (id INT, username STRING(64), password STRING(64))
/// admin/database             (id INT, name STRING(64))
/// admin/database_permission  (accountid INT, databaseid INT)
/// ```
///
/// New ids come from each table's header `record_count` + 1, so ids are
/// never reused even after rows are deleted.
pub struct Catalog<'a> {
    root: &'a Path,
}

impl<'a> Catalog<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    /// Creates `<root>/admin` and the three system tables.
    ///
    /// Only called when the database root does not exist yet.
    pub fn bootstrap(root: &Path) -> StorageResult<()> {
        storage::create_database(root, ADMIN_DATABASE)?;
        for (table, definition) in [
            (ACCOUNT_TABLE, ACCOUNT_SCHEMA),
            (DATABASE_TABLE, DATABASE_SCHEMA),
            (PERMISSION_TABLE, PERMISSION_SCHEMA),
        ] {
            let attributes = Attribute::parse_list(definition)?;
            TableFile::new(root, ADMIN_DATABASE, table).create(&attributes)?;
        }
        info!(root = %root.display(), "bootstrapped system tables");
        Ok(())
    }

    fn table(&self, name: &str) -> TableFile {
        TableFile::new(self.root, ADMIN_DATABASE, name)
    }

    /// Encodes a text or numeric key for an equality lookup.
    fn key(schema: &Schema, column: &str, value: &Value) -> StorageResult<FieldValue> {
        let field = schema.field(column)?;
        let mut bytes = vec![0u8; field.attribute.size];
        value.encode_into(&mut bytes);
        Ok(FieldValue {
            attribute: field.attribute.name.clone(),
            bytes,
        })
    }

    fn next_id(table: &TableFile) -> StorageResult<i32> {
        Ok(table.header()?.record_count + 1)
    }

    fn account_rows(&self, username: &[u8]) -> StorageResult<(Schema, Vec<Vec<Value>>)> {
        let table = self.table(ACCOUNT_TABLE);
        let schema = table.read_schema()?;
        let key = Self::key(&schema, "username", &Value::Text(username.to_vec()))?;
        let rows = table
            .scan(Some(&key))?
            .iter()
            .map(|r| schema.decode_record(&r.payload))
            .collect();
        Ok((schema, rows))
    }

    /// Looks an account up by username.
    pub fn find_account(&self, username: &str) -> StorageResult<Option<Account>> {
        let (_, rows) = self.account_rows(username.as_bytes())?;
        Ok(rows.first().map(|row| Account {
            id: as_int(&row[0]),
            username: row[1].to_string(),
        }))
    }

    /// Adds an account row.
    ///
    /// ## Returns
    /// * `Ok(Some(id))` - account created with the next id
    /// * `Ok(None)` - the username is already taken
    pub fn create_account(&self, username: &str, password: &str) -> StorageResult<Option<i32>> {
        if self.find_account(username)?.is_some() {
            return Ok(None);
        }
        let table = self.table(ACCOUNT_TABLE);
        let schema = table.read_schema()?;
        let id = Self::next_id(&table)?;
        let payload = schema.encode_record(&[
            Value::Int(id),
            Value::Text(username.as_bytes().to_vec()),
            Value::Text(password.as_bytes().to_vec()),
        ]);
        table.insert(&payload)?;
        Ok(Some(id))
    }

    /// Checks a login attempt.
    ///
    /// The username must match exactly one row and the stored password
    /// bytes must equal the supplied password, both compared over the full
    /// 64-byte column width.
    ///
    /// ## Returns
    /// * `Ok(Some(account_id))` - credentials are valid
    /// * `Ok(None)` - unknown user or wrong password
    pub fn authenticate(&self, username: &[u8], password: &[u8]) -> StorageResult<Option<i32>> {
        let (schema, rows) = self.account_rows(username)?;
        let [row] = rows.as_slice() else {
            return Ok(None);
        };
        let width = schema.field("password")?.attribute.size;
        let mut supplied = vec![0u8; width];
        Value::Text(password.to_vec()).encode_into(&mut supplied);
        let mut stored = vec![0u8; width];
        row[2].encode_into(&mut stored);
        Ok((supplied == stored).then(|| as_int(&row[0])))
    }

    /// Looks a registered database up by name.
    pub fn find_database(&self, name: &str) -> StorageResult<Option<i32>> {
        let table = self.table(DATABASE_TABLE);
        let schema = table.read_schema()?;
        let key = Self::key(&schema, "name", &Value::Text(name.as_bytes().to_vec()))?;
        Ok(table
            .scan(Some(&key))?
            .first()
            .map(|r| as_int(&schema.decode_record(&r.payload)[0])))
    }

    /// Adds a registry row and returns the new database id.
    pub fn register_database(&self, name: &str) -> StorageResult<i32> {
        if self.find_database(name)?.is_some() {
            return Err(StorageError::DatabaseExists(name.to_string()));
        }
        let table = self.table(DATABASE_TABLE);
        let schema = table.read_schema()?;
        let id = Self::next_id(&table)?;
        table.insert(&schema.encode_record(&[Value::Int(id), Value::Text(name.as_bytes().to_vec())]))?;
        Ok(id)
    }

    /// Lets `account_id` open database `database_id`.
    pub fn grant(&self, account_id: i32, database_id: i32) -> StorageResult<()> {
        if self.has_permission(account_id, database_id)? {
            return Ok(());
        }
        let table = self.table(PERMISSION_TABLE);
        let schema = table.read_schema()?;
        table.insert(&schema.encode_record(&[Value::Int(account_id), Value::Int(database_id)]))?;
        Ok(())
    }

    pub fn has_permission(&self, account_id: i32, database_id: i32) -> StorageResult<bool> {
        let table = self.table(PERMISSION_TABLE);
        let schema = table.read_schema()?;
        let key = Self::key(&schema, "accountid", &Value::Int(account_id))?;
        let column = schema.field("databaseid")?.clone();
        Ok(table.scan(Some(&key))?.iter().any(|r| {
            Value::decode(&column.attribute, &r.payload[column.range()]) == Value::Int(database_id)
        }))
    }

    /// Removes the registry row and every permission row of a database.
    pub fn unregister_database(&self, database_id: i32) -> StorageResult<()> {
        let registry = self.table(DATABASE_TABLE);
        let schema = registry.read_schema()?;
        registry.delete(Some(&Self::key(&schema, "id", &Value::Int(database_id))?))?;

        let permissions = self.table(PERMISSION_TABLE);
        let schema = permissions.read_schema()?;
        permissions.delete(Some(&Self::key(&schema, "databaseid", &Value::Int(database_id))?))?;
        Ok(())
    }
}

fn as_int(value: &Value) -> i32 {
    match value {
        Value::Int(v) => *v,
        _ => 0,
    }
}
