/// Identifier column of every tenant table.
pub const ID_COLUMN: &str = "id";

/// Prefix of the joined hierarchy path column emitted per security field.
pub const UNIT_COLUMN_PREFIX: &str = "unit_";

/// Mode literal that switches a permission layer to explicit rules.
pub const CUSTOM_MODE: &str = "custom";

/// Instance scope literal that discards inherited rules.
pub const REPLACE_SCOPE: &str = "replace";

/// Column-list entry meaning "every active field".
pub const ALL_FIELDS_MARKER: &str = "*";

/// Name of the path column joined for `field`.
#[must_use]
pub fn unit_column(field: &str) -> String {
    format!("{UNIT_COLUMN_PREFIX}{field}")
}
