use sea_orm::sea_query::{Alias, Condition, Expr, Func, LikeExpr, SimpleExpr};
use schemagate_security::constants::{ID_COLUMN, unit_column};
use schemagate_security::{InstanceSecurity, PathPredicate, SchemaSecurity, TreeAnchor};

/// Alias of the tenant table in every scoped query.
pub const SCHEMA_ALIAS: &str = "sch";

const LIKE_ESCAPE: char = '\\';

/// Condition matching no row at all.
#[must_use]
pub fn deny_all() -> Condition {
    Condition::all().add(Expr::value(false))
}

/// `CAST(<table>.<column> AS text)`.
#[must_use]
pub fn text_col(table: &str, column: &str) -> SimpleExpr {
    Func::cast_as(
        Expr::col((Alias::new(table), Alias::new(column))),
        Alias::new("text"),
    )
    .into()
}

/// Row filter for a schema that scopes rows.
///
/// A row passes when its path for any security field falls under the user's
/// recorded pattern for the backing tree, or when its id has an instance
/// override. Fields without a usable user pattern contribute nothing. When
/// nothing contributes the result denies every row.
///
/// Returns `None` when the schema does not scope rows.
#[must_use]
pub fn row_scope_condition(
    schema: &SchemaSecurity,
    instances: Option<&InstanceSecurity>,
) -> Option<Condition> {
    if !schema.scopes_rows() {
        return None;
    }

    let mut any = Condition::any();

    for (field, tree) in &schema.security_fields {
        let Some(user_path) = schema.user_path(tree) else {
            tracing::debug!(field = %field, tree = %tree, "no recorded user path, field not scoped");
            continue;
        };
        let Some(anchor) = TreeAnchor::parse(user_path) else {
            tracing::debug!(field = %field, tree = %tree, "empty user path, field not scoped");
            continue;
        };
        any = any.add(path_condition(
            &text_col(&unit_column(field), "path"),
            &anchor,
        ));
    }

    let ids: Vec<String> = instances
        .map(|i| i.row_ids().map(ToOwned::to_owned).collect())
        .unwrap_or_default();
    if !ids.is_empty() {
        any = any.add(Expr::expr(text_col(SCHEMA_ALIAS, ID_COLUMN)).is_in(ids));
    }

    if any.is_empty() {
        return Some(deny_all());
    }
    Some(any)
}

/// Any of the anchor's predicates applied to `path`.
#[must_use]
pub fn path_condition(path: &SimpleExpr, anchor: &TreeAnchor) -> Condition {
    anchor
        .predicates()
        .into_iter()
        .fold(Condition::any(), |cond, predicate| {
            cond.add(predicate_expr(path.clone(), predicate))
        })
}

fn predicate_expr(path: SimpleExpr, predicate: PathPredicate) -> SimpleExpr {
    let path = Expr::expr(path);
    match predicate {
        PathPredicate::Equals(s) => path.eq(s),
        PathPredicate::StartsWith(s) => path.like(like(format!("{}%", like_escape(&s)))),
        PathPredicate::EndsWith(s) => path.like(like(format!("%{}", like_escape(&s)))),
        PathPredicate::Contains(s) => path.like(like(format!("%{}%", like_escape(&s)))),
    }
}

fn like(pattern: String) -> LikeExpr {
    LikeExpr::new(pattern).escape(LIKE_ESCAPE)
}

fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push(LIKE_ESCAPE);
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use sea_orm::sea_query::{PostgresQueryBuilder, Query};
    use std::collections::{BTreeMap, HashMap};

    fn render(cond: Condition) -> String {
        Query::select()
            .expr(Expr::value(1))
            .cond_where(cond)
            .to_string(PostgresQueryBuilder)
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(like_escape("a_b%c\\d"), "a\\_b\\%c\\\\d");
        assert_eq!(like_escape("42"), "42");
    }

    #[test]
    fn exact_anchor_renders_two_predicates() {
        let anchor = TreeAnchor::parse("42").unwrap();
        let sql = render(path_condition(&text_col("unit_dept", "path"), &anchor));
        assert!(sql.contains(r#"CAST("unit_dept"."path" AS text) = '42'"#), "{sql}");
        assert!(sql.contains("LIKE '%.42'"), "{sql}");
        assert!(!sql.contains("'42.%'"), "{sql}");
    }

    #[test]
    fn descendant_anchor_renders_four_predicates() {
        let anchor = TreeAnchor::parse("42*").unwrap();
        let sql = render(path_condition(&text_col("unit_dept", "path"), &anchor));
        assert!(sql.contains("LIKE '42.%'"), "{sql}");
        assert!(sql.contains("LIKE '%.42.%'"), "{sql}");
        assert_eq!(sql.matches(" OR ").count(), 3, "{sql}");
    }

    #[test]
    fn schema_without_row_scoping_has_no_condition() {
        let schema = SchemaSecurity::default();
        assert!(row_scope_condition(&schema, None).is_none());
    }

    #[test]
    fn nothing_to_match_denies_every_row() {
        let schema = SchemaSecurity {
            permission_instance: "custom".into(),
            security_fields: BTreeMap::from([("dept".to_owned(), "org".to_owned())]),
            user_trees_security: HashMap::from([("org".to_owned(), "*".to_owned())]),
            ..SchemaSecurity::default()
        };
        let sql = render(row_scope_condition(&schema, None).unwrap());
        assert!(sql.ends_with("WHERE FALSE"), "{sql}");
    }
}
