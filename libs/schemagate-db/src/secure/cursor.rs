use sea_orm::QueryResult;
use serde_json::Value;
use schemagate_security::Row;

use crate::error::ScanError;
use crate::secure::select::{ColumnKind, OutputColumn};

/// Forward-only iterator over the rows of a scoped query.
///
/// `close` releases whatever the cursor holds and must be safe to call more
/// than once. Rows yielded after `close` are unspecified.
pub trait RowCursor: Send {
    fn next_row(&mut self) -> Option<Result<Row, ScanError>>;

    fn close(&mut self);
}

/// Cursor over rows already held in memory.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    rows: std::vec::IntoIter<Result<Row, ScanError>>,
    closed: bool,
}

impl BufferedCursor {
    #[must_use]
    pub fn new(rows: Vec<Result<Row, ScanError>>) -> Self {
        Self {
            rows: rows.into_iter(),
            closed: false,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl From<Vec<Row>> for BufferedCursor {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows.into_iter().map(Ok).collect())
    }
}

impl RowCursor for BufferedCursor {
    fn next_row(&mut self) -> Option<Result<Row, ScanError>> {
        if self.closed {
            return None;
        }
        self.rows.next()
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows = Vec::new().into_iter();
    }
}

/// Cursor decoding raw `SeaORM` rows by the layout of the query that
/// produced them.
pub struct QueryResultCursor {
    rows: std::vec::IntoIter<QueryResult>,
    columns: Vec<OutputColumn>,
}

impl QueryResultCursor {
    #[must_use]
    pub fn new(rows: Vec<QueryResult>, columns: Vec<OutputColumn>) -> Self {
        Self {
            rows: rows.into_iter(),
            columns,
        }
    }
}

impl RowCursor for QueryResultCursor {
    fn next_row(&mut self) -> Option<Result<Row, ScanError>> {
        let raw = self.rows.next()?;
        Some(decode_row(&raw, &self.columns))
    }

    fn close(&mut self) {
        self.rows = Vec::new().into_iter();
    }
}

fn decode_row(raw: &QueryResult, columns: &[OutputColumn]) -> Result<Row, ScanError> {
    let mut row = Row::new();
    for column in columns {
        let name = column.name.as_str();
        let value = match column.kind {
            ColumnKind::Text => raw
                .try_get::<Option<String>>("", name)
                .map(|v| v.map_or(Value::Null, Value::String)),
            ColumnKind::Json => raw
                .try_get::<Option<Value>>("", name)
                .map(Option::unwrap_or_default),
        }
        .map_err(|e| ScanError::new(name, e.to_string()))?;
        row.insert(column.name.clone(), value);
    }
    Ok(row)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use sea_orm::{ConnectionTrait, DbBackend, MockDatabase, Statement};
    use serde_json::json;

    fn column(name: &str, kind: ColumnKind) -> OutputColumn {
        OutputColumn {
            name: name.to_owned(),
            kind,
        }
    }

    fn row(id: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".to_owned(), json!(id));
        row
    }

    #[test]
    fn buffered_cursor_yields_rows_in_order() {
        let mut cursor = BufferedCursor::from(vec![row("a"), row("b")]);
        assert_eq!(cursor.next_row().unwrap().unwrap()["id"], "a");
        assert_eq!(cursor.next_row().unwrap().unwrap()["id"], "b");
        assert!(cursor.next_row().is_none());
    }

    #[test]
    fn closed_cursor_yields_nothing() {
        let mut cursor = BufferedCursor::new(vec![Ok(row("a")), Err(ScanError::new("x", "bad"))]);
        cursor.close();
        cursor.close();
        assert!(cursor.is_closed());
        assert!(cursor.next_row().is_none());
    }

    #[tokio::test]
    async fn query_rows_decode_by_column_kind() {
        let conn = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![BTreeMap::from([
                ("id", sea_orm::Value::from("c-1")),
                ("unit_dept", sea_orm::Value::String(None)),
                ("amount", sea_orm::Value::from(json!(10))),
                ("total", sea_orm::Value::from(json!("12.50"))),
            ])]])
            .into_connection();
        let raw = conn
            .query_all(Statement::from_string(DbBackend::Postgres, "SELECT 1"))
            .await
            .unwrap();

        let mut cursor = QueryResultCursor::new(
            raw,
            vec![
                column("id", ColumnKind::Text),
                column("unit_dept", ColumnKind::Text),
                column("amount", ColumnKind::Json),
                column("total", ColumnKind::Json),
            ],
        );

        let row = cursor.next_row().unwrap().unwrap();
        assert_eq!(
            serde_json::Value::Object(row),
            json!({ "id": "c-1", "unit_dept": null, "amount": 10, "total": "12.50" })
        );
        assert!(cursor.next_row().is_none());
    }
}
