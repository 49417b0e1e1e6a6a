use super::error::ExecError;
use super::tokenizer::{tokenize, Tokens};

/// `column = literal`, used by WHERE and SET clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    /// Raw literal text, quotes included
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `SELECT *`
    All,
    Columns(Vec<String>),
}

/// One parsed script line.
///
/// Names are kept exactly as typed; validation and lowercasing happen when
/// the statement runs, so that failures are reported per statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    CreateUser { username: String, password: String },
    CreateDatabase { name: String },
    CreateTable { name: String, definition: String },
    DropDatabase { name: String },
    DropTable { name: String },
    DropColumn { column: String, table: String },
    Grant { database: String, username: String },
    Use { database: String },
    Insert { table: String, values: Vec<String> },
    Select { projection: Projection, table: String, filter: Option<Condition> },
    Update { table: String, assignment: Condition, filter: Option<Condition> },
    Delete { table: String, filter: Option<Condition> },
}

impl Statement {
    /// Parses one script line.
    ///
    /// ## Grammar
    /// ```text
    /// CREATE USER <name> IDENTIFIED BY <password>
    /// CREATE DATABASE <name>
    /// CREATE TABLE <name> (<col> <TYPE>, ...)
    /// DROP DATABASE <name> | DROP TABLE <name> | DROP COLUMN <col> FROM <table>
    /// GRANT PERMISSION <database> INTO <user>
    /// USE <database>
    /// INSERT INTO <table> [VALUES] (<v1>, <v2>, ...)
    /// SELECT {* | c1, c2, ...} FROM <table> [WHERE <col>=<value>]
    /// UPDATE <table> SET <col>=<value> [WHERE <col>=<value>]
    /// DELETE FROM <table> [WHERE <col>=<value>]
    /// ```
    /// Keywords are case-insensitive; a trailing `;` is ignored.
    pub fn parse(line: &str) -> Result<Statement, ExecError> {
        let mut tokens = tokenize(line);
        let head = word(&mut tokens)?.to_ascii_uppercase();
        let statement = match head.as_str() {
            "CREATE" => parse_create(&mut tokens)?,
            "DROP" => parse_drop(&mut tokens)?,
            "GRANT" => {
                expect(&mut tokens, "PERMISSION")?;
                let database = word(&mut tokens)?;
                expect(&mut tokens, "INTO")?;
                let username = word(&mut tokens)?;
                Statement::Grant { database, username }
            }
            "USE" => Statement::Use {
                database: word(&mut tokens)?,
            },
            "INSERT" => {
                expect(&mut tokens, "INTO")?;
                let table = word(&mut tokens)?;
                tokens.eat("VALUES");
                let values = values(&mut tokens)?;
                Statement::Insert { table, values }
            }
            "SELECT" => {
                let columns = tokens.take_until("FROM");
                expect(&mut tokens, "FROM")?;
                let table = word(&mut tokens)?;
                Statement::Select {
                    projection: projection(columns)?,
                    table,
                    filter: filter(&mut tokens)?,
                }
            }
            "UPDATE" => {
                let table = word(&mut tokens)?;
                expect(&mut tokens, "SET")?;
                let assignment = condition(&tokens.take_until("WHERE"))?;
                Statement::Update {
                    table,
                    assignment,
                    filter: filter(&mut tokens)?,
                }
            }
            "DELETE" => {
                expect(&mut tokens, "FROM")?;
                let table = word(&mut tokens)?;
                Statement::Delete {
                    table,
                    filter: filter(&mut tokens)?,
                }
            }
            other => return Err(ExecError::script(format!("unknown statement {other}"))),
        };

        if !tokens.is_exhausted() {
            return Err(ExecError::script(format!(
                "unexpected trailing input {:?}",
                tokens.remaining()
            )));
        }
        Ok(statement)
    }

    /// Short description used in failure replies, e.g. "create table".
    pub fn action(&self) -> &'static str {
        match self {
            Statement::CreateUser { .. } => "create account",
            Statement::CreateDatabase { .. } => "create database",
            Statement::CreateTable { .. } => "create table",
            Statement::DropDatabase { .. } => "drop database",
            Statement::DropTable { .. } => "drop table",
            Statement::DropColumn { .. } => "drop column",
            Statement::Grant { .. } => "grant permission",
            Statement::Use { .. } => "open database",
            Statement::Insert { .. } => "insert data",
            Statement::Select { .. } => "select data",
            Statement::Update { .. } => "update data",
            Statement::Delete { .. } => "delete data",
        }
    }
}

fn parse_create(tokens: &mut Tokens) -> Result<Statement, ExecError> {
    let kind = word(tokens)?.to_ascii_uppercase();
    match kind.as_str() {
        "USER" => {
            let username = word(tokens)?;
            expect(tokens, "IDENTIFIED")?;
            expect(tokens, "BY")?;
            let password = crate::engine::unquote(&word(tokens)?).to_string();
            Ok(Statement::CreateUser { username, password })
        }
        "DATABASE" => Ok(Statement::CreateDatabase { name: word(tokens)? }),
        "TABLE" => {
            let name = word(tokens)?;
            let definition = word(tokens)?;
            Ok(Statement::CreateTable { name, definition })
        }
        other => Err(ExecError::script(format!("cannot CREATE {other}"))),
    }
}

fn parse_drop(tokens: &mut Tokens) -> Result<Statement, ExecError> {
    let kind = word(tokens)?.to_ascii_uppercase();
    match kind.as_str() {
        "DATABASE" => Ok(Statement::DropDatabase { name: word(tokens)? }),
        "TABLE" => Ok(Statement::DropTable { name: word(tokens)? }),
        "COLUMN" => {
            let column = word(tokens)?;
            expect(tokens, "FROM")?;
            let table = word(tokens)?;
            Ok(Statement::DropColumn { column, table })
        }
        other => Err(ExecError::script(format!("cannot DROP {other}"))),
    }
}

fn word(tokens: &mut Tokens) -> Result<String, ExecError> {
    tokens
        .pop()
        .map(str::to_string)
        .ok_or_else(|| ExecError::script("unexpected end of script"))
}

fn expect(tokens: &mut Tokens, keyword: &str) -> Result<(), ExecError> {
    if tokens.eat(keyword) {
        Ok(())
    } else {
        Err(ExecError::script(format!("expected {keyword}")))
    }
}

/// INSERT literals: a `(...)` group, `VALUES(...)` glued to its group, or
/// bare values. Group contents are split again with the same tokenizer.
fn values(tokens: &mut Tokens) -> Result<Vec<String>, ExecError> {
    let mut out = Vec::new();
    while let Some(token) = tokens.pop() {
        let token = match token.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("VALUES(") && token.ends_with(')') => {
                &token[7..token.len() - 1]
            }
            _ => token,
        };
        out.extend(tokenize(token).remaining().iter().cloned());
    }
    if out.is_empty() {
        return Err(ExecError::script("INSERT without values"));
    }
    Ok(out)
}

fn projection(columns: Vec<String>) -> Result<Projection, ExecError> {
    if columns.is_empty() {
        return Err(ExecError::script("SELECT without columns"));
    }
    if columns.len() == 1 && columns[0] == "*" {
        return Ok(Projection::All);
    }
    if columns.iter().any(|c| c == "*") {
        return Err(ExecError::script("* mixed with columns"));
    }
    Ok(Projection::Columns(columns))
}

fn filter(tokens: &mut Tokens) -> Result<Option<Condition>, ExecError> {
    if tokens.is_exhausted() {
        return Ok(None);
    }
    expect(tokens, "WHERE")?;
    let rest = tokens.remaining().to_vec();
    while tokens.pop().is_some() {}
    condition(&rest).map(Some)
}

/// Joins clause tokens and splits at the first `=` outside quotes, so
/// `id=1`, `id = 1` and `name = 'a b'` all parse.
fn condition(parts: &[String]) -> Result<Condition, ExecError> {
    let text = parts.join(" ");
    let mut in_quote = false;
    let split = text.char_indices().find(|&(_, c)| {
        if c == '\'' {
            in_quote = !in_quote;
        }
        c == '=' && !in_quote
    });
    let Some((at, _)) = split else {
        return Err(ExecError::script(format!("expected col=value, got {text:?}")));
    };
    let column = text[..at].trim();
    let literal = text[at + 1..].trim();
    if column.is_empty() || literal.is_empty() || column.contains(char::is_whitespace) {
        return Err(ExecError::script(format!("malformed condition {text:?}")));
    }
    Ok(Condition {
        column: column.to_string(),
        literal: literal.to_string(),
    })
}
