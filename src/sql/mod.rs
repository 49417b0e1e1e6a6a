//! Script interpretation: tokenizing, parsing, authorizing and executing
//! one statement line against the [`Engine`].

use tracing::{debug, info, warn};

use crate::engine::{
    execute_select_scan, identifier, Attribute, Engine, FieldValue, ResultSet, StorageError,
    TableFile, ADMIN_DATABASE, MAX_CREDENTIAL_LENGTH,
};
use crate::session::{Identity, Session};

mod auth;
mod error;
mod statement;
mod tokenizer;

pub use auth::{authorize, Capability};
pub use error::ExecError;
pub use statement::{Condition, Projection, Statement};
pub use tokenizer::{tokenize, Tokens};

/// Reply to a script frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Status text, sent as one `'M'` frame.
    Message(String),
    /// SELECT result, sent with the multi-frame row protocol.
    Rows(ResultSet),
}

impl Reply {
    fn message(text: impl Into<String>) -> Self {
        Reply::Message(text.into())
    }
}

/// Parses and executes one script line on behalf of `session`.
///
/// This is the single entry point of the statement layer. It never fails:
/// every error is turned into a `Reply::Message`, so one bad statement
/// cannot end a connection.
///
/// ## Processing Pipeline
/// ```text
/// line → tokenize → Statement::parse → authorize → storage call → Reply
/// ```
///
/// ## Replies
/// * unauthenticated session: `Not authenticated`
/// * unknown or malformed statement: `Script error`
/// * failed statement: `Failed to <action>: <reason>`
/// * success: statement specific text, or `Reply::Rows` for SELECT
///
/// ## Example
/// ```rust,ignore
/// let mut session = Session::authenticated(Identity::Root);
/// execute(&engine, &mut session, "CREATE DATABASE shop");
/// execute(&engine, &mut session, "USE shop");
/// let reply = execute(&engine, &mut session, "SELECT * FROM items");
/// ```
pub fn execute(engine: &Engine, session: &mut Session, line: &str) -> Reply {
    if session.identity().is_none() {
        return Reply::message("Not authenticated");
    }

    let statement = match Statement::parse(line) {
        Ok(statement) => statement,
        Err(err) => {
            if let ExecError::Script(detail) = &err {
                debug!(%detail, "script rejected");
            }
            return Reply::message(err.to_string());
        }
    };

    match run(engine, session, &statement) {
        Ok(reply) => reply,
        Err(ExecError::Script(detail)) => {
            debug!(%detail, "script rejected");
            Reply::message("Script error")
        }
        Err(err) => {
            warn!(action = statement.action(), error = %err, "statement failed");
            Reply::Message(format!("Failed to {}: {}", statement.action(), err))
        }
    }
}

fn run(engine: &Engine, session: &mut Session, statement: &Statement) -> Result<Reply, ExecError> {
    let catalog = engine.catalog();
    match statement {
        Statement::CreateUser { username, password } => {
            authorize(session, &catalog, Capability::ManageAccounts)?;
            credential("username", username)?;
            credential("password", password)?;
            let id = catalog
                .create_account(username, password)?
                .ok_or_else(|| ExecError::AccountExists(username.clone()))?;
            info!(%username, id, "account created");
            Ok(Reply::message("Account created"))
        }

        Statement::CreateDatabase { name } => {
            authorize(session, &catalog, Capability::CreateDatabase)?;
            let name = database_name(name)?;
            if catalog.find_database(&name)?.is_some() {
                return Err(StorageError::DatabaseExists(name).into());
            }
            let id = engine.create_database(&name, || catalog.register_database(&name))?;
            if let Some(Identity::Account(account_id)) = session.identity() {
                catalog.grant(account_id, id)?;
            }
            info!(db = %name, id, "database created");
            Ok(Reply::message("Database created"))
        }

        Statement::CreateTable { name, definition } => {
            let table = open_table(engine, session, name)?;
            let attributes = Attribute::parse_list(definition)?;
            table.create(&attributes)?;
            Ok(Reply::message("Table created"))
        }

        Statement::DropDatabase { name } => {
            let name = database_name(name)?;
            authorize(session, &catalog, Capability::DropDatabase { name: &name })?;
            let id = catalog
                .find_database(&name)?
                .ok_or_else(|| StorageError::DatabaseNotFound(name.clone()))?;
            match engine.remove_database(&name) {
                Ok(()) | Err(StorageError::DatabaseNotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
            catalog.unregister_database(id)?;
            session.close_database();
            info!(db = %name, id, "database dropped");
            Ok(Reply::message("Database dropped"))
        }

        Statement::DropTable { name } => {
            open_table(engine, session, name)?.remove()?;
            Ok(Reply::message("Table dropped"))
        }

        Statement::DropColumn { column, table } => {
            open_table(engine, session, table)?.drop_column(column)?;
            Ok(Reply::message("Column dropped"))
        }

        Statement::Grant { database, username } => {
            authorize(session, &catalog, Capability::ManageAccounts)?;
            let database = database_name(database)?;
            let database_id = catalog
                .find_database(&database)?
                .ok_or_else(|| StorageError::DatabaseNotFound(database.clone()))?;
            let account = catalog
                .find_account(username)?
                .ok_or_else(|| ExecError::AccountNotFound(username.clone()))?;
            catalog.grant(account.id, database_id)?;
            info!(db = %database, username = %account.username, "permission granted");
            Ok(Reply::message("Permission granted"))
        }

        Statement::Use { database } => {
            session.close_database();
            let name = identifier(database)?;
            if name == ADMIN_DATABASE {
                return Err(StorageError::DatabaseNotFound(name).into());
            }
            let database_id = catalog
                .find_database(&name)?
                .ok_or_else(|| StorageError::DatabaseNotFound(name.clone()))?;
            authorize(session, &catalog, Capability::OpenDatabase { database_id })?;
            session.open(name, database_id);
            Ok(Reply::message("Database opened"))
        }

        Statement::Insert { table, values } => {
            let table = open_table(engine, session, table)?;
            let schema = table.read_schema()?;
            let payload = schema.encode_literals(values)?;
            table.insert(&payload)?;
            Ok(Reply::message("Data inserted"))
        }

        Statement::Select { projection, table, filter } => {
            let table = open_table(engine, session, table)?;
            let filter = field_value(&table, filter.as_ref())?;
            let columns = match projection {
                Projection::All => None,
                Projection::Columns(columns) => Some(columns.as_slice()),
            };
            let result = execute_select_scan(&table, filter.as_ref(), columns)?;
            Ok(Reply::Rows(result))
        }

        Statement::Update { table, assignment, filter } => {
            let table = open_table(engine, session, table)?;
            let set = table.read_schema()?.field_value(&assignment.column, &assignment.literal)?;
            let filter = field_value(&table, filter.as_ref())?;
            let count = table.update(&set, filter.as_ref())?;
            Ok(Reply::Message(format!("{count} row(s) updated")))
        }

        Statement::Delete { table, filter } => {
            let table = open_table(engine, session, table)?;
            let filter = field_value(&table, filter.as_ref())?;
            let count = table.delete(filter.as_ref())?;
            Ok(Reply::Message(format!("{count} row(s) deleted")))
        }
    }
}

/// Resolves a table of the session's open database.
fn open_table(engine: &Engine, session: &Session, name: &str) -> Result<TableFile, ExecError> {
    authorize(session, &engine.catalog(), Capability::UseOpenDatabase)?;
    let database = session.open_database().ok_or(ExecError::NoDatabaseOpen)?;
    Ok(engine.table(database, &identifier(name)?))
}

/// Validates a database name a client may create or drop.
fn database_name(name: &str) -> Result<String, ExecError> {
    let name = identifier(name)?;
    if name == ADMIN_DATABASE {
        return Err(ExecError::ReservedName(name));
    }
    Ok(name)
}

fn credential(field: &'static str, value: &str) -> Result<(), ExecError> {
    if value.is_empty() || value.len() > MAX_CREDENTIAL_LENGTH {
        return Err(ExecError::InvalidCredential {
            field,
            limit: MAX_CREDENTIAL_LENGTH,
        });
    }
    Ok(())
}

fn field_value(table: &TableFile, condition: Option<&Condition>) -> Result<Option<FieldValue>, ExecError> {
    let Some(condition) = condition else {
        return Ok(None);
    };
    let schema = table.read_schema()?;
    Ok(Some(schema.field_value(&condition.column, &condition.literal)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Engine, Session) {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path().join("db")).unwrap();
        (tmp, engine, Session::authenticated(Identity::Root))
    }

    fn text(reply: Reply) -> String {
        match reply {
            Reply::Message(text) => text,
            Reply::Rows(rows) => panic!("expected a message, got {rows:?}"),
        }
    }

    #[test]
    fn unauthenticated_session_is_refused() {
        let (_tmp, engine, _) = setup();
        let mut session = Session::new();
        assert_eq!(text(execute(&engine, &mut session, "CREATE DATABASE x")), "Not authenticated");
    }

    #[test]
    fn unknown_statement_is_a_script_error() {
        let (_tmp, engine, mut root) = setup();
        assert_eq!(text(execute(&engine, &mut root, "EXPLAIN everything")), "Script error");
        assert_eq!(text(execute(&engine, &mut root, "CREATE VIEW v")), "Script error");
    }

    #[test]
    fn table_statements_need_an_open_database() {
        let (_tmp, engine, mut root) = setup();
        assert_eq!(
            text(execute(&engine, &mut root, "CREATE TABLE t (id INT)")),
            "Failed to create table: no database is open"
        );
    }

    #[test]
    fn admin_is_reserved() {
        let (_tmp, engine, mut root) = setup();
        assert!(text(execute(&engine, &mut root, "CREATE DATABASE admin")).starts_with("Failed to create database"));
        assert!(text(execute(&engine, &mut root, "USE Admin")).starts_with("Failed to open database"));
        assert!(!root.is_database_open());
    }

    #[test]
    fn duplicate_database_is_rejected() {
        let (_tmp, engine, mut root) = setup();
        assert_eq!(text(execute(&engine, &mut root, "CREATE DATABASE shop")), "Database created");
        assert!(text(execute(&engine, &mut root, "create database SHOP")).starts_with("Failed to create database"));
    }

    #[test]
    fn delete_reports_counts() {
        let (_tmp, engine, mut root) = setup();
        for line in [
            "CREATE DATABASE shop",
            "USE shop",
            "CREATE TABLE items (id INT, name STRING(8))",
            "INSERT INTO items VALUES (1, 'a')",
            "INSERT INTO items VALUES (2, 'b')",
            "INSERT INTO items VALUES (3, 'a')",
        ] {
            execute(&engine, &mut root, line);
        }
        assert_eq!(text(execute(&engine, &mut root, "DELETE FROM items WHERE name='a'")), "2 row(s) deleted");
        assert_eq!(text(execute(&engine, &mut root, "DELETE FROM items")), "1 row(s) deleted");
    }
}
