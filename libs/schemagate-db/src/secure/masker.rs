use std::collections::BTreeMap;

use schemagate_security::constants::ID_COLUMN;
use schemagate_security::{ColumnResolver, Row};

use crate::SecureQueryError;
use crate::error::ScanError;
use crate::secure::cursor::RowCursor;

/// Closes the cursor when dropped, whatever path leaves the drain loop.
struct CursorGuard<'c> {
    cursor: &'c mut dyn RowCursor,
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        self.cursor.close();
    }
}

/// Applies column visibility to the rows of a scoped query and strips the
/// helper columns the query added.
#[derive(Clone, Copy, Debug)]
pub struct ResultMasker<'a> {
    resolver: ColumnResolver<'a>,
    keeps_id: bool,
    column_fields: Option<&'a BTreeMap<String, String>>,
}

impl<'a> ResultMasker<'a> {
    /// `keeps_id` retains the row id in the output; otherwise it is removed
    /// with the other helper columns.
    #[must_use]
    pub fn new(resolver: ColumnResolver<'a>, keeps_id: bool) -> Self {
        Self {
            resolver,
            keeps_id,
            column_fields: None,
        }
    }

    /// Governs output columns by the security field they map to instead of
    /// their own name. Unmapped columns stay visible.
    #[must_use]
    pub fn with_column_fields(mut self, column_fields: Option<&'a BTreeMap<String, String>>) -> Self {
        self.column_fields = column_fields;
        self
    }

    /// Drops every column of `row` the user may not see, then the helper
    /// columns.
    #[must_use]
    pub fn mask_row(&self, mut row: Row) -> Row {
        let decision = self.resolver.for_row(&row);
        let schema = self.resolver.schema();
        row.retain(|column, _| {
            if column == ID_COLUMN {
                return self.keeps_id;
            }
            if schema.is_helper_column(column) {
                return false;
            }
            self.field_for(column)
                .is_none_or(|field| decision.is_visible(field))
        });
        row
    }

    /// Reads `cursor` to the end, masking each row, and closes it.
    ///
    /// A row that fails to decode does not stop the read: the remaining rows
    /// are consumed so the cursor is released cleanly, then the first
    /// failure is returned and no rows are.
    ///
    /// # Errors
    /// Returns [`SecureQueryError::Scan`] for the first undecodable row.
    pub fn drain(&self, cursor: &mut dyn RowCursor) -> Result<Vec<Row>, SecureQueryError> {
        let guard = CursorGuard { cursor };
        let mut rows = Vec::new();
        let mut first_error: Option<ScanError> = None;

        while let Some(next) = guard.cursor.next_row() {
            match next {
                Ok(row) => {
                    if first_error.is_none() {
                        rows.push(self.mask_row(row));
                    }
                }
                Err(e) => {
                    tracing::warn!(column = %e.column, error = %e, "row decode failed, draining cursor");
                    first_error.get_or_insert(e);
                }
            }
        }
        drop(guard);

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(rows),
        }
    }

    fn field_for<'c>(&self, column: &'c str) -> Option<&'c str>
    where
        'a: 'c,
    {
        match self.column_fields {
            None => Some(column),
            Some(map) => map.get(column).map(String::as_str),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::secure::cursor::BufferedCursor;
    use schemagate_security::SchemaSecurity;
    use serde_json::{Value, json};
    use tracing_test::traced_test;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn custom_schema() -> SchemaSecurity {
        serde_json::from_value(json!({
            "permission_structure": "custom",
            "security_fields": { "dept": "org" },
            "view": { "amount": true }
        }))
        .unwrap()
    }

    #[test]
    fn helper_columns_are_removed() {
        let schema = custom_schema();
        let masker = ResultMasker::new(ColumnResolver::new(&schema, None), false);

        let out = masker.mask_row(row(json!({
            "id": "a", "amount": 1, "title": "t", "unit_dept": "1.2"
        })));
        assert_eq!(Value::Object(out), json!({ "amount": 1 }));
    }

    #[test]
    fn requested_id_is_kept() {
        let schema = custom_schema();
        let masker = ResultMasker::new(ColumnResolver::new(&schema, None), true);

        let out = masker.mask_row(row(json!({ "id": "a", "amount": 1, "unit_dept": null })));
        assert_eq!(Value::Object(out), json!({ "id": "a", "amount": 1 }));
    }

    #[test]
    fn column_fields_map_aliases_to_security_fields() {
        let schema = custom_schema();
        let map = BTreeMap::from([
            ("total".to_owned(), "amount".to_owned()),
            ("label".to_owned(), "title".to_owned()),
        ]);
        let masker = ResultMasker::new(ColumnResolver::new(&schema, None), false)
            .with_column_fields(Some(&map));

        let out = masker.mask_row(row(json!({
            "id": "a", "total": 5, "label": "x", "free": true
        })));
        assert_eq!(Value::Object(out), json!({ "total": 5, "free": true }));
    }

    #[test]
    fn schema_without_masking_keeps_all_data_columns() {
        let schema = SchemaSecurity {
            security_fields: BTreeMap::from([("dept".to_owned(), "org".to_owned())]),
            ..SchemaSecurity::default()
        };
        let masker = ResultMasker::new(ColumnResolver::new(&schema, None), false);

        let out = masker.mask_row(row(json!({ "id": "a", "x": 1, "unit_dept": "9" })));
        assert_eq!(Value::Object(out), json!({ "x": 1 }));
    }

    #[test]
    #[traced_test]
    fn decode_failure_drains_and_closes_cursor() {
        let schema = custom_schema();
        let masker = ResultMasker::new(ColumnResolver::new(&schema, None), false);
        let mut cursor = BufferedCursor::new(vec![
            Ok(row(json!({ "id": "a", "amount": 1 }))),
            Err(ScanError::new("amount", "not json")),
            Ok(row(json!({ "id": "b", "amount": 2 }))),
            Err(ScanError::new("title", "second")),
        ]);

        let err = masker.drain(&mut cursor).unwrap_err();
        match err {
            SecureQueryError::Scan(e) => assert_eq!(e.column, "amount"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(cursor.is_closed());
        assert!(logs_contain("row decode failed"));
    }

    #[test]
    fn successful_drain_closes_cursor() {
        let schema = custom_schema();
        let masker = ResultMasker::new(ColumnResolver::new(&schema, None), false);
        let mut cursor = BufferedCursor::from(vec![
            row(json!({ "id": "a", "amount": 1, "title": "x" })),
            row(json!({ "id": "b", "amount": 2 })),
        ]);

        let rows = masker.drain(&mut cursor).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(Value::Object(rows[0].clone()), json!({ "amount": 1 }));
        assert!(cursor.is_closed());
    }
}
