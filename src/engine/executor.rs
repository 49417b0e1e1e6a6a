use crate::engine::{FieldValue, StorageResult, TableFile, Value};

/// Column names plus decoded rows of a SELECT.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Executes a SELECT with a full table scan, optional equality filter and
/// column projection.
///
/// ## Query Processing Pipeline
/// ```text
/// Table File → Slot Scan → Equality Filter → Column Projection → ResultSet
///                  ↑              ↑                  ↑
///          FILLED slots only  WHERE clause      SELECT list
/// ```
///
/// ## Column Projection
/// - **None**: every column, in schema order (`SELECT *`)
/// - **Some(cols)**: the named columns in the requested order. Every name is
///   checked against the schema before scanning; one unknown column fails
///   the whole statement.
///
/// ## Returns
/// * `Ok(result)` - matching rows in file order
/// * `Err(StorageError::TableNotFound | AttributeNotFound)`
pub fn execute_select_scan(
    table: &TableFile,
    filter: Option<&FieldValue>,
    cols: Option<&[String]>,
) -> StorageResult<ResultSet> {
    let schema = table.read_schema()?;
    let fields = match cols {
        None => schema.fields().to_vec(),
        Some(names) => names
            .iter()
            .map(|name| schema.field(name).cloned())
            .collect::<StorageResult<Vec<_>>>()?,
    };

    let rows = table
        .scan(filter)?
        .into_iter()
        .map(|record| {
            fields
                .iter()
                .map(|f| Value::decode(&f.attribute, &record.payload[f.range()]))
                .collect()
        })
        .collect();

    Ok(ResultSet {
        columns: fields.into_iter().map(|f| f.attribute.name).collect(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Attribute, Engine, StorageError};
    use tempfile::TempDir;

    fn people() -> (TempDir, TableFile) {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::open(tmp.path().join("db")).unwrap();
        engine.create_database("hr", || Ok(())).unwrap();
        let table = engine.table("hr", "people");
        let schema = table
            .create(&Attribute::parse_list("id INT, name STRING(10), age INT").unwrap())
            .unwrap();
        for (id, name, age) in [(1, "ann", 30), (2, "ben", 41), (3, "cid", 30)] {
            let payload = schema
                .encode_literals(&[id.to_string(), format!("'{name}'"), age.to_string()])
                .unwrap();
            table.insert(&payload).unwrap();
        }
        (tmp, table)
    }

    #[test]
    fn select_star_returns_all_columns() {
        let (_tmp, table) = people();
        let rs = execute_select_scan(&table, None, None).unwrap();
        assert_eq!(rs.columns, vec!["id", "name", "age"]);
        assert_eq!(rs.rows.len(), 3);
        assert_eq!(rs.rows[1][1], Value::Text(b"ben".to_vec()));
    }

    #[test]
    fn projection_follows_requested_order() {
        let (_tmp, table) = people();
        let schema = table.read_schema().unwrap();
        let filter = schema.field_value("age", "30").unwrap();
        let cols = vec!["name".to_string(), "id".to_string()];
        let rs = execute_select_scan(&table, Some(&filter), Some(&cols)).unwrap();
        assert_eq!(rs.columns, cols);
        assert_eq!(
            rs.rows,
            vec![
                vec![Value::Text(b"ann".to_vec()), Value::Int(1)],
                vec![Value::Text(b"cid".to_vec()), Value::Int(3)],
            ]
        );
    }

    #[test]
    fn unknown_column_fails_whole_select() {
        let (_tmp, table) = people();
        let cols = vec!["id".to_string(), "salary".to_string()];
        assert!(matches!(
            execute_select_scan(&table, None, Some(&cols)),
            Err(StorageError::AttributeNotFound(name)) if name == "salary"
        ));
    }
}
