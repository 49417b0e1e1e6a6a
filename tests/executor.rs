use filedb::engine::{Engine, ResultSet, Value};
use filedb::session::{Identity, Session};
use filedb::sql::{execute, Reply};
use tempfile::TempDir;

struct Fixture {
    _tmp: TempDir,
    engine: Engine,
    root: Session,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path().join("databases")).unwrap();
        Fixture {
            _tmp: tmp,
            engine,
            root: Session::authenticated(Identity::Root),
        }
    }

    fn as_root(&mut self, line: &str) -> String {
        message(execute(&self.engine, &mut self.root, line))
    }

    fn select(&mut self, line: &str) -> ResultSet {
        rows(execute(&self.engine, &mut self.root, line))
    }

    fn run(&self, session: &mut Session, line: &str) -> Reply {
        execute(&self.engine, session, line)
    }

    fn login(&self, username: &str, password: &str) -> Session {
        let mut session = Session::new();
        session.begin_login();
        let account = self
            .engine
            .catalog()
            .authenticate(username.as_bytes(), password.as_bytes())
            .unwrap();
        session.complete_login(account);
        session
    }
}

fn message(reply: Reply) -> String {
    match reply {
        Reply::Message(text) => text,
        Reply::Rows(rows) => panic!("expected a message, got {rows:?}"),
    }
}

fn rows(reply: Reply) -> ResultSet {
    match reply {
        Reply::Rows(rows) => rows,
        Reply::Message(text) => panic!("expected rows, got {text:?}"),
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.as_bytes().to_vec())
}

#[test]
fn creator_is_granted_and_others_are_refused() {
    let mut fx = Fixture::new();
    assert_eq!(fx.as_root("CREATE USER alice IDENTIFIED BY pw1"), "Account created");
    assert_eq!(fx.as_root("CREATE USER bob IDENTIFIED BY pw2"), "Account created");

    let mut alice = fx.login("alice", "pw1");
    let mut bob = fx.login("bob", "pw2");
    assert_eq!(alice.identity(), Some(Identity::Account(1)));
    assert_eq!(bob.identity(), Some(Identity::Account(2)));

    assert_eq!(message(fx.run(&mut alice, "CREATE DATABASE shop")), "Database created");
    assert_eq!(message(fx.run(&mut alice, "USE shop")), "Database opened");
    assert_eq!(alice.open_database(), Some("shop"));

    assert_eq!(
        message(fx.run(&mut bob, "USE shop")),
        "Failed to open database: permission denied"
    );
    assert!(!bob.is_database_open());

    // root opens any registered database
    assert_eq!(fx.as_root("USE shop"), "Database opened");
}

#[test]
fn only_root_manages_accounts_and_grants() {
    let mut fx = Fixture::new();
    fx.as_root("CREATE USER alice IDENTIFIED BY pw1");
    fx.as_root("CREATE USER bob IDENTIFIED BY pw2");
    let mut alice = fx.login("alice", "pw1");
    let mut bob = fx.login("bob", "pw2");

    assert_eq!(
        message(fx.run(&mut alice, "CREATE USER eve IDENTIFIED BY x")),
        "Failed to create account: permission denied"
    );
    assert!(fx.engine.catalog().find_account("eve").unwrap().is_none());

    fx.run(&mut alice, "CREATE DATABASE shop");
    assert_eq!(
        message(fx.run(&mut alice, "GRANT PERMISSION shop INTO bob")),
        "Failed to grant permission: permission denied"
    );
    assert_eq!(fx.as_root("GRANT PERMISSION shop INTO bob"), "Permission granted");
    assert_eq!(message(fx.run(&mut bob, "USE shop")), "Database opened");

    assert!(fx.as_root("CREATE USER alice IDENTIFIED BY other").starts_with("Failed to create account"));
    assert!(fx.as_root("GRANT PERMISSION shop INTO nobody").starts_with("Failed to grant permission"));
    assert!(fx.as_root("GRANT PERMISSION nowhere INTO bob").starts_with("Failed to grant permission"));
}

#[test]
fn wrong_password_does_not_authenticate() {
    let mut fx = Fixture::new();
    fx.as_root("CREATE USER alice IDENTIFIED BY pw1");
    let mut session = fx.login("alice", "pw2");
    assert_eq!(session.identity(), None);
    assert_eq!(message(fx.run(&mut session, "CREATE DATABASE shop")), "Not authenticated");
}

#[test]
fn insert_select_update_round_trip() {
    let mut fx = Fixture::new();
    for line in [
        "CREATE DATABASE shop",
        "USE shop",
        "CREATE TABLE items (id INT, name STRING(10))",
    ] {
        fx.as_root(line);
    }
    assert_eq!(fx.as_root("INSERT INTO items VALUES (1, 'alice')"), "Data inserted");
    assert_eq!(fx.as_root("INSERT INTO items VALUES (2, 'carol')"), "Data inserted");

    let result = fx.select("SELECT * FROM items WHERE id=1");
    assert_eq!(result.columns, vec!["id", "name"]);
    assert_eq!(result.rows, vec![vec![Value::Int(1), text("alice")]]);

    assert_eq!(fx.as_root("UPDATE items SET name='bob' WHERE id=1"), "1 row(s) updated");
    let result = fx.select("SELECT name FROM items WHERE id = 1");
    assert_eq!(result.rows, vec![vec![text("bob")]]);

    let all = fx.select("SELECT * FROM items");
    assert_eq!(all.rows.len(), 2);
}

#[test]
fn numeric_and_text_types_are_stored_by_declaration() {
    let mut fx = Fixture::new();
    for line in [
        "CREATE DATABASE lab",
        "USE lab",
        "CREATE TABLE samples (n LONG, weight DECIMAL, taken DATE, note STRING(4))",
        "INSERT INTO samples (9000000000, 2.5, '2024-01-31', 'truncated')",
    ] {
        fx.as_root(line);
    }
    let result = fx.select("SELECT * FROM samples");
    assert_eq!(
        result.rows,
        vec![vec![
            Value::Long(9_000_000_000),
            Value::Decimal(2.5),
            text("2024-01-31"),
            text("trun"),
        ]]
    );
}

#[test]
fn malformed_value_aborts_the_insert() {
    let mut fx = Fixture::new();
    for line in ["CREATE DATABASE shop", "USE shop", "CREATE TABLE items (id INT, name STRING(10))"] {
        fx.as_root(line);
    }
    let before = fx.engine.table("shop", "items").header().unwrap();

    let reply = fx.as_root("INSERT INTO items VALUES ('abc', 'x')");
    assert!(reply.starts_with("Failed to insert data"), "{reply}");
    assert!(fx.as_root("INSERT INTO items VALUES (1, 'x', 'extra')").starts_with("Failed to insert data"));

    assert_eq!(fx.engine.table("shop", "items").header().unwrap(), before);
    assert!(fx.select("SELECT * FROM items").rows.is_empty());
}

#[test]
fn missing_trailing_values_are_zero() {
    let mut fx = Fixture::new();
    for line in [
        "CREATE DATABASE shop",
        "USE shop",
        "CREATE TABLE items (id INT, name STRING(10), stock INT)",
        "INSERT INTO items VALUES (7)",
    ] {
        fx.as_root(line);
    }
    let result = fx.select("SELECT * FROM items");
    assert_eq!(result.rows, vec![vec![Value::Int(7), text(""), Value::Int(0)]]);
}

#[test]
fn unknown_column_fails_the_whole_select() {
    let mut fx = Fixture::new();
    for line in ["CREATE DATABASE shop", "USE shop", "CREATE TABLE items (id INT)", "INSERT INTO items (1)"] {
        fx.as_root(line);
    }
    assert!(fx.as_root("SELECT id, price FROM items").starts_with("Failed to select data"));
    assert!(fx.as_root("SELECT * FROM items WHERE price=1").starts_with("Failed to select data"));
    assert!(fx.as_root("SELECT * FROM missing").starts_with("Failed to select data"));
}

#[test]
fn drop_column_and_drop_table() {
    let mut fx = Fixture::new();
    for line in [
        "CREATE DATABASE shop",
        "USE shop",
        "CREATE TABLE items (id INT, name STRING(10), stock INT)",
        "INSERT INTO items VALUES (1, 'pen', 5)",
    ] {
        fx.as_root(line);
    }
    assert_eq!(fx.as_root("DROP COLUMN name FROM items"), "Column dropped");
    let result = fx.select("SELECT * FROM items");
    assert_eq!(result.columns, vec!["id", "stock"]);
    assert_eq!(result.rows, vec![vec![Value::Int(1), Value::Int(5)]]);

    assert_eq!(fx.as_root("DROP TABLE items"), "Table dropped");
    assert!(fx.as_root("DROP TABLE items").starts_with("Failed to drop table"));
}

#[test]
fn drop_database_purges_registry_and_permissions() {
    let mut fx = Fixture::new();
    fx.as_root("CREATE USER alice IDENTIFIED BY pw1");
    let mut alice = fx.login("alice", "pw1");
    fx.run(&mut alice, "CREATE DATABASE shop");
    fx.run(&mut alice, "CREATE DATABASE other");
    fx.run(&mut alice, "USE shop");
    fx.run(&mut alice, "CREATE TABLE items (id INT)");

    assert!(message(fx.run(&mut alice, "DROP DATABASE other")).starts_with("Failed to drop database"));
    assert_eq!(message(fx.run(&mut alice, "DROP DATABASE SHOP")), "Database dropped");
    assert!(!alice.is_database_open());

    let catalog = fx.engine.catalog();
    assert_eq!(catalog.find_database("shop").unwrap(), None);
    assert!(!catalog.has_permission(1, 1).unwrap());
    assert!(catalog.has_permission(1, 2).unwrap());
    assert!(!fx.engine.root().join("shop").exists());

    assert!(message(fx.run(&mut alice, "USE shop")).starts_with("Failed to open database"));
}

#[test]
fn open_database_does_not_follow_a_recreated_name() {
    let mut fx = Fixture::new();
    fx.as_root("CREATE USER alice IDENTIFIED BY pw1");
    fx.as_root("CREATE USER eve IDENTIFIED BY pw2");
    let mut alice = fx.login("alice", "pw1");
    let mut eve = fx.login("eve", "pw2");

    assert_eq!(message(fx.run(&mut alice, "CREATE DATABASE shop")), "Database created");
    assert_eq!(message(fx.run(&mut alice, "USE shop")), "Database opened");
    assert_eq!(fx.as_root("USE shop"), "Database opened");
    assert_eq!(fx.as_root("DROP DATABASE shop"), "Database dropped");

    for line in [
        "CREATE DATABASE shop",
        "USE shop",
        "CREATE TABLE secrets (note STRING(16))",
        "INSERT INTO secrets VALUES ('eve-only')",
    ] {
        fx.run(&mut eve, line);
    }
    let eve_shop = fx.engine.catalog().find_database("shop").unwrap();
    assert!(eve_shop.is_some());

    assert_eq!(
        message(fx.run(&mut alice, "SELECT * FROM secrets")),
        "Failed to select data: database shop does not exist"
    );
    assert!(message(fx.run(&mut alice, "INSERT INTO secrets VALUES ('alice')")).starts_with("Failed to insert data"));
    assert!(message(fx.run(&mut alice, "DROP DATABASE shop")).starts_with("Failed to drop database"));

    assert_eq!(fx.engine.catalog().find_database("shop").unwrap(), eve_shop);
    let result = rows(fx.run(&mut eve, "SELECT * FROM secrets"));
    assert_eq!(result.rows, vec![vec![text("eve-only")]]);
    assert!(message(fx.run(&mut alice, "USE shop")).starts_with("Failed to open database"));
}

#[test]
fn filtered_delete_frees_slots_for_reuse() {
    let mut fx = Fixture::new();
    for line in [
        "CREATE DATABASE shop",
        "USE shop",
        "CREATE TABLE items (id INT)",
        "INSERT INTO items (1)",
        "INSERT INTO items (2)",
        "INSERT INTO items (3)",
    ] {
        fx.as_root(line);
    }
    assert_eq!(fx.as_root("DELETE FROM items WHERE id=2"), "1 row(s) deleted");
    fx.as_root("INSERT INTO items (4)");

    let ids: Vec<Value> = fx.select("SELECT id FROM items")
        .rows
        .into_iter()
        .map(|mut row| row.remove(0))
        .collect();
    assert_eq!(ids, vec![Value::Int(1), Value::Int(4), Value::Int(3)]);

    assert_eq!(fx.as_root("DELETE FROM items"), "3 row(s) deleted");
    assert!(fx.select("SELECT * FROM items").rows.is_empty());
}
