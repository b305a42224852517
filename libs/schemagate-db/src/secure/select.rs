use std::collections::{BTreeMap, HashSet};

use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Alias, Condition, Expr, Func, JoinType, Order, Query, SelectStatement};
use sea_orm::{DbBackend, Statement};
use schemagate_security::constants::{ID_COLUMN, unit_column};
use schemagate_security::{InstanceSecurity, OutputColumns, SchemaSecurity};

use crate::SecureQueryError;
use crate::config::SecureQueryConfig;
use crate::secure::cond::{SCHEMA_ALIAS, row_scope_condition, text_col};
use crate::secure::ident::ensure_identifier;

const SUB_ALIAS: &str = "sub";

/// How a result column is decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    /// Text value, `NULL` decodes to JSON null.
    Text,
    /// JSON value: document fields, and sub-select columns through `to_jsonb`.
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl OutputColumn {
    fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OrderBy {
    pub column: String,
    pub order: Order,
}

/// A caller-built query joined to the tenant table on `sub.id = sch.id`.
///
/// Its `columns` replace the projected document fields.
#[derive(Clone, Debug)]
pub struct SubSelect {
    pub query: SelectStatement,
    pub columns: Vec<String>,
}

/// Caller knobs for one scoped read.
#[must_use]
#[derive(Clone, Debug, Default)]
pub struct SecureQueryOptions {
    /// Output fields. `None` falls back to the schema's configured list.
    pub columns: Option<OutputColumns>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Extra predicates, ANDed with the row scope.
    pub conditions: Vec<Condition>,
    pub sub_select: Option<SubSelect>,
    /// Output column -> security field it is governed by. Columns absent
    /// from the map are never masked. `None` maps every column to itself.
    pub column_fields: Option<BTreeMap<String, String>>,
}

impl SecureQueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: OutputColumns) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn sub_select(mut self, query: SelectStatement, columns: Vec<String>) -> Self {
        self.sub_select = Some(SubSelect { query, columns });
        self
    }

    pub fn column_field(mut self, column: impl Into<String>, field: impl Into<String>) -> Self {
        self.column_fields
            .get_or_insert_with(BTreeMap::new)
            .insert(column.into(), field.into());
        self
    }
}

/// A built scoped query and the layout of the rows it returns.
#[derive(Clone, Debug)]
pub struct ScopedQuery {
    select: SelectStatement,
    columns: Vec<OutputColumn>,
    keeps_id: bool,
}

impl ScopedQuery {
    #[must_use]
    pub fn select(&self) -> &SelectStatement {
        &self.select
    }

    /// Parameterized `PostgreSQL` statement.
    #[must_use]
    pub fn statement(&self) -> Statement {
        DbBackend::Postgres.build(&self.select)
    }

    #[must_use]
    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    /// Whether the caller asked for the row id as an output column.
    #[must_use]
    pub fn keeps_id(&self) -> bool {
        self.keeps_id
    }
}

/// Builds the scoped SELECT for one schema of one user.
#[derive(Clone, Copy, Debug)]
pub struct QueryScopeBuilder<'a> {
    config: &'a SecureQueryConfig,
    schema_code: &'a str,
    schema: &'a SchemaSecurity,
    instances: Option<&'a InstanceSecurity>,
}

impl<'a> QueryScopeBuilder<'a> {
    #[must_use]
    pub fn new(
        config: &'a SecureQueryConfig,
        schema_code: &'a str,
        schema: &'a SchemaSecurity,
        instances: Option<&'a InstanceSecurity>,
    ) -> Self {
        Self {
            config,
            schema_code,
            schema,
            instances,
        }
    }

    /// Builds the query projecting `fields` from the tenant document, or the
    /// sub-select columns when the options carry one.
    ///
    /// The projection always includes the text row id and, when the schema
    /// has security fields, one `unit_<field>` path per field taken from a
    /// LEFT JOIN on the hierarchy tables. Every user-derived value is bound
    /// as a parameter.
    ///
    /// # Errors
    /// Returns [`SecureQueryError::InvalidIdentifier`] when a schema code,
    /// field code, column or configured table name is not a plain
    /// identifier, or when a requested column collides with a helper
    /// column.
    pub fn build(
        &self,
        fields: &[String],
        options: &SecureQueryOptions,
    ) -> Result<ScopedQuery, SecureQueryError> {
        self.config.validate()?;
        let table = self.config.instances_table(self.schema_code)?;

        let mut select = Query::select();
        select.from_as(Alias::new(table), Alias::new(SCHEMA_ALIAS));
        select.expr_as(text_col(SCHEMA_ALIAS, ID_COLUMN), Alias::new(ID_COLUMN));

        let mut columns = vec![OutputColumn::new(ID_COLUMN, ColumnKind::Text)];
        let keeps_id = self.project_fields(&mut select, &mut columns, fields, options)?;
        self.join_hierarchy(&mut select, &mut columns)?;

        if let Some(sub) = &options.sub_select {
            select.join_subquery(
                JoinType::InnerJoin,
                sub.query.clone(),
                Alias::new(SUB_ALIAS),
                Expr::col((Alias::new(SUB_ALIAS), Alias::new(ID_COLUMN)))
                    .equals((Alias::new(SCHEMA_ALIAS), Alias::new(ID_COLUMN))),
            );
        }

        let mut filter = Condition::all();
        if let Some(scope) = row_scope_condition(self.schema, self.instances) {
            filter = filter.add(scope);
        }
        for condition in &options.conditions {
            filter = filter.add(condition.clone());
        }
        if !filter.is_empty() {
            select.cond_where(filter);
        }

        for order in &options.order_by {
            ensure_identifier(&order.column)?;
            select.order_by(Alias::new(&order.column), order.order.clone());
        }
        if let Some(limit) = options.limit {
            select.limit(limit);
        }
        if let Some(offset) = options.offset {
            select.offset(offset);
        }

        Ok(ScopedQuery {
            select,
            columns,
            keeps_id,
        })
    }

    /// Projects the requested columns. Returns whether the row id was among
    /// them.
    fn project_fields(
        &self,
        select: &mut SelectStatement,
        columns: &mut Vec<OutputColumn>,
        fields: &[String],
        options: &SecureQueryOptions,
    ) -> Result<bool, SecureQueryError> {
        let document = self.config.document_column.as_str();
        let requested = match &options.sub_select {
            Some(sub) => sub.columns.as_slice(),
            None => fields,
        };

        let mut keeps_id = false;
        let mut seen = HashSet::new();
        for column in requested {
            ensure_identifier(column)?;
            if column == ID_COLUMN {
                keeps_id = true;
                continue;
            }
            if self.schema.is_helper_column(column) {
                return Err(SecureQueryError::InvalidIdentifier(format!(
                    "{column} is reserved for hierarchy paths"
                )));
            }
            if !seen.insert(column.as_str()) {
                continue;
            }
            if options.sub_select.is_some() {
                // Sub-select columns have caller-defined types; jsonb decodes them all.
                select.expr_as(
                    Func::cust(Alias::new("to_jsonb"))
                        .arg(Expr::col((Alias::new(SUB_ALIAS), Alias::new(column)))),
                    Alias::new(column),
                );
            } else {
                select.expr_as(
                    Expr::col((Alias::new(SCHEMA_ALIAS), Alias::new(document)))
                        .get_json_field(column.as_str()),
                    Alias::new(column),
                );
            }
            columns.push(OutputColumn::new(column, ColumnKind::Json));
        }
        Ok(keeps_id)
    }

    /// One LEFT JOIN pair per security field: the tree by code, then the
    /// unit whose code is the row's value for the field.
    fn join_hierarchy(
        &self,
        select: &mut SelectStatement,
        columns: &mut Vec<OutputColumn>,
    ) -> Result<(), SecureQueryError> {
        let document = self.config.document_column.as_str();
        for (field, tree) in &self.schema.security_fields {
            ensure_identifier(field)?;
            let tree_alias = format!("tree_{field}");
            let unit_alias = unit_column(field);

            select.expr_as(text_col(&unit_alias, "path"), Alias::new(&unit_alias));
            columns.push(OutputColumn::new(&unit_alias, ColumnKind::Text));

            let row_unit = Expr::col((Alias::new(SCHEMA_ALIAS), Alias::new(document)))
                .cast_json_field(field.as_str());
            select.join_as(
                JoinType::LeftJoin,
                Alias::new(&self.config.tables.trees),
                Alias::new(&tree_alias),
                Expr::col((Alias::new(&tree_alias), Alias::new("code"))).eq(tree.as_str()),
            );
            select.join_as(
                JoinType::LeftJoin,
                Alias::new(&self.config.tables.tree_units),
                Alias::new(&unit_alias),
                Condition::all()
                    .add(
                        Expr::col((Alias::new(&unit_alias), Alias::new("tree_id")))
                            .equals((Alias::new(&tree_alias), Alias::new("id"))),
                    )
                    .add(Expr::col((Alias::new(&unit_alias), Alias::new("code"))).eq(row_unit)),
            );
        }
        Ok(())
    }
}
