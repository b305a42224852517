#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schemagate_db::error::{CatalogError, ScanError};
use schemagate_db::secure::BufferedCursor;
use schemagate_db::{
    FieldCatalog, RowCursor, RowSource, ScopedQuery, SecureInstanceReader, SecureQueryConfig,
    SecureQueryError, SecureQueryOptions,
};
use schemagate_security::{OutputColumns, Row, SecurityProfile};
use sea_orm::DbErr;
use sea_orm::sea_query::PostgresQueryBuilder;
use serde_json::{Value, json};

/// Hands back canned rows and remembers the SQL it was asked to run.
#[derive(Default)]
struct CannedRows {
    rows: Mutex<Vec<Result<Row, ScanError>>>,
    seen_sql: Mutex<Vec<String>>,
}

impl CannedRows {
    fn with_rows(rows: Vec<Result<Row, ScanError>>) -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(rows),
            seen_sql: Mutex::default(),
        })
    }

    fn calls(&self) -> usize {
        self.seen_sql.lock().unwrap().len()
    }

    fn last_sql(&self) -> String {
        self.seen_sql.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl RowSource for CannedRows {
    async fn open(&self, query: &ScopedQuery) -> Result<Box<dyn RowCursor>, DbErr> {
        self.seen_sql
            .lock()
            .unwrap()
            .push(query.select().to_string(PostgresQueryBuilder));
        let rows = std::mem::take(&mut *self.rows.lock().unwrap());
        Ok(Box::new(BufferedCursor::new(rows)))
    }
}

struct FixedCatalog(Vec<&'static str>);

#[async_trait]
impl FieldCatalog for FixedCatalog {
    async fn active_fields(&self, _schema_code: &str) -> Result<Vec<String>, CatalogError> {
        Ok(self.0.iter().map(|f| (*f).to_owned()).collect())
    }
}

struct BrokenCatalog;

#[async_trait]
impl FieldCatalog for BrokenCatalog {
    async fn active_fields(&self, _schema_code: &str) -> Result<Vec<String>, CatalogError> {
        Err(CatalogError::Db(DbErr::Custom("catalog offline".to_owned())))
    }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row must be an object, got {other}"),
    }
}

fn contract_profile() -> SecurityProfile {
    serde_json::from_value(json!({
        "security": { "schema": { "contract": {
            "permission_instance": "custom",
            "permission_structure": "custom",
            "security_fields": { "dept": "org-tree" },
            "user_trees_security": { "org-tree": "42*" },
            "view": { "title": true },
            "trees": [
                { "tree": "org-tree", "tree_unit": "42", "permission": "custom", "view": { "amount": true } }
            ]
        } } },
        "security_instances": { "schema": { "contract": { "instance": {
            "c-3": { "permission_scope": "replace", "permission": "default" }
        } } } }
    }))
    .unwrap()
}

fn reader(rows: Arc<CannedRows>, catalog: Arc<dyn FieldCatalog>) -> SecureInstanceReader {
    SecureInstanceReader::new(SecureQueryConfig::default(), rows, catalog)
}

#[tokio::test]
async fn masks_columns_per_row_and_strips_helpers() {
    let rows = CannedRows::with_rows(vec![
        Ok(row(json!({ "id": "c-1", "amount": 10, "title": "in", "unit_dept": "10.42.7" }))),
        Ok(row(json!({ "id": "c-2", "amount": 20, "title": "out", "unit_dept": "10.99" }))),
        Ok(row(json!({ "id": "c-3", "amount": 30, "title": "own", "unit_dept": null }))),
    ]);
    let reader = reader(rows.clone(), Arc::new(FixedCatalog(vec!["amount", "title"])));

    let out = reader
        .get_security_instances(&contract_profile(), "contract", &SecureQueryOptions::new())
        .await
        .unwrap();

    let out: Vec<Value> = out.into_iter().map(Value::Object).collect();
    assert_eq!(
        out,
        [
            json!({ "amount": 10, "title": "in" }),
            json!({ "title": "out" }),
            json!({ "amount": 30, "title": "own" }),
        ]
    );
    let sql = rows.last_sql();
    assert!(sql.contains(r#""sch"."data" -> 'amount' AS "amount""#), "{sql}");
    assert!(sql.contains(r#""sch"."data" -> 'title' AS "title""#), "{sql}");
}

#[tokio::test]
async fn schema_missing_from_profile_reads_nothing() {
    let rows = CannedRows::with_rows(vec![Ok(row(json!({ "id": "x" })))]);
    let reader = reader(rows.clone(), Arc::new(BrokenCatalog));

    let out = reader
        .get_security_instances(&contract_profile(), "invoice", &SecureQueryOptions::new())
        .await
        .unwrap();

    assert!(out.is_empty());
    assert_eq!(rows.calls(), 0);
}

#[tokio::test]
async fn explicit_columns_skip_the_catalog() -> anyhow::Result<()> {
    let rows = CannedRows::with_rows(vec![Ok(row(
        json!({ "id": "c-1", "title": "t", "unit_dept": "42" }),
    ))]);
    let reader = reader(rows.clone(), Arc::new(BrokenCatalog));
    let opts = SecureQueryOptions::new().columns(OutputColumns::fields(["id", "title"]));

    let out = reader
        .get_security_instances(&contract_profile(), "contract", &opts)
        .await?;

    assert_eq!(Value::Object(out[0].clone()), json!({ "id": "c-1", "title": "t" }));
    assert!(!rows.last_sql().contains("'amount'"));
    Ok(())
}

#[tokio::test]
async fn configured_column_list_is_used_before_catalog() {
    let profile: SecurityProfile = serde_json::from_value(json!({
        "security": { "schema": { "contract": { "query_data_columns": "title" } } }
    }))
    .unwrap();
    let rows = CannedRows::with_rows(vec![]);
    let reader = reader(rows.clone(), Arc::new(BrokenCatalog));

    reader
        .get_security_instances(&profile, "contract", &SecureQueryOptions::new())
        .await
        .unwrap();

    assert!(rows.last_sql().contains("'title'"));
}

#[tokio::test]
async fn catalog_failure_is_a_metadata_error() {
    let profile: SecurityProfile = serde_json::from_value(json!({
        "security": { "schema": { "contract": { "query_data_columns": "*" } } }
    }))
    .unwrap();
    let rows = CannedRows::with_rows(vec![]);
    let reader = reader(rows.clone(), Arc::new(BrokenCatalog));

    let err = reader
        .get_security_instances(&profile, "contract", &SecureQueryOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SecureQueryError::Metadata(_)));
    assert_eq!(rows.calls(), 0);
}

#[tokio::test]
async fn decode_failure_discards_partial_results() {
    let rows = CannedRows::with_rows(vec![
        Ok(row(json!({ "id": "c-1", "title": "a", "unit_dept": "42" }))),
        Err(ScanError::new("title", "invalid json")),
    ]);
    let reader = reader(rows, Arc::new(FixedCatalog(vec!["title"])));

    let err = reader
        .get_security_instances(&contract_profile(), "contract", &SecureQueryOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SecureQueryError::Scan(e) if e.column == "title"));
}

#[tokio::test]
async fn column_aliases_follow_their_security_field() {
    let rows = CannedRows::with_rows(vec![Ok(row(
        json!({ "id": "c-2", "total": 5, "label": "x", "unit_dept": "10.99" }),
    ))]);
    let reader = reader(rows, Arc::new(FixedCatalog(vec![])));
    let mut sub = sea_orm::sea_query::Query::select();
    sub.column(sea_orm::sea_query::Alias::new("id"))
        .from(sea_orm::sea_query::Alias::new("totals"));
    let opts = SecureQueryOptions::new()
        .sub_select(sub, vec!["total".to_owned(), "label".to_owned()])
        .column_field("total", "amount")
        .column_field("label", "title");

    let out = reader
        .get_security_instances(&contract_profile(), "contract", &opts)
        .await
        .unwrap();

    assert_eq!(Value::Object(out[0].clone()), json!({ "label": "x" }));
}
