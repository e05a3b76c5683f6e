//! SQL rendering of query descriptions

use crate::catalog::Field;
use crate::source::SelectQuery;
use crate::state::StreamKey;
use crate::value::CursorValue;
use std::fmt::Write;

/// Quote an identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL literal of a bound value
pub fn literal(value: &CursorValue) -> String {
    match value {
        CursorValue::Boolean(true) => "TRUE".to_string(),
        CursorValue::Boolean(false) => "FALSE".to_string(),
        CursorValue::Integer(i) => i.to_string(),
        CursorValue::Number(n) => format!("CAST({} AS DOUBLE)", quote_literal(&n.to_string())),
        CursorValue::String(s) => quote_literal(s),
        CursorValue::Date(_) => format!("DATE {}", quote_literal(&value.to_string())),
        CursorValue::Timestamp(_) => format!("TIMESTAMP {}", quote_literal(&value.to_string())),
        CursorValue::TimestampTz(_) => {
            format!("TIMESTAMPTZ {}", quote_literal(&value.to_string()))
        }
        CursorValue::Binary(_) => format!("from_base64({})", quote_literal(&value.to_string())),
    }
}

/// Fully qualified table of a stream
///
/// `catalog` is the attach name, `default_schema` applies to streams
/// without a namespace.
pub fn table_name(stream: &StreamKey, catalog: Option<&str>, default_schema: Option<&str>) -> String {
    catalog
        .into_iter()
        .chain(stream.namespace.as_deref().or(default_schema))
        .chain(std::iter::once(stream.name.as_str()))
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Tuple comparison `columns > values` (or `<=`), expanded for portability
fn tuple_condition(columns: &[Field], values: &[CursorValue], above: bool) -> String {
    let mut alternatives = Vec::with_capacity(columns.len() + 1);
    for (i, (column, value)) in columns.iter().zip(values).enumerate() {
        let mut terms: Vec<String> = columns[..i]
            .iter()
            .zip(values)
            .map(|(c, v)| format!("{} = {}", quote_ident(&c.name), literal(v)))
            .collect();
        let op = if above { ">" } else { "<" };
        terms.push(format!("{} {op} {}", quote_ident(&column.name), literal(value)));
        alternatives.push(terms.join(" AND "));
    }
    if !above {
        let equal: Vec<String> = columns
            .iter()
            .zip(values)
            .map(|(c, v)| format!("{} = {}", quote_ident(&c.name), literal(v)))
            .collect();
        alternatives.push(equal.join(" AND "));
    }
    let alternatives: Vec<String> = alternatives.into_iter().map(|a| format!("({a})")).collect();
    format!("({})", alternatives.join(" OR "))
}

/// Render a select over `table`
pub fn select(query: &SelectQuery, table: &str) -> String {
    let columns = if query.columns.is_empty() {
        "*".to_string()
    } else {
        query
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut sql = format!("SELECT {columns} FROM {table}");

    let mut conditions = Vec::new();
    if let Some(lower) = &query.lower_bound {
        conditions.push(tuple_condition(&query.order_by, lower, true));
    }
    if let Some(upper) = &query.upper_bound {
        conditions.push(tuple_condition(&query.order_by, upper, false));
    }
    if let Some(rate) = query.sample_rate {
        conditions.push(format!("random() < {rate}"));
    }
    if !conditions.is_empty() {
        let _ = write!(sql, " WHERE {}", conditions.join(" AND "));
    }

    if !query.order_by.is_empty() {
        let order: Vec<String> = query
            .order_by
            .iter()
            .map(|c| format!("{} ASC NULLS FIRST", quote_ident(&c.name)))
            .collect();
        let _ = write!(sql, " ORDER BY {}", order.join(", "));
    }
    if let Some(limit) = query.limit {
        let _ = write!(sql, " LIMIT {limit}");
    }
    sql
}

/// Largest non-null tuple of `columns`
pub fn max_tuple(columns: &[Field], table: &str) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let not_null: Vec<String> = names.iter().map(|n| format!("{n} IS NOT NULL")).collect();
    let order: Vec<String> = names.iter().map(|n| format!("{n} DESC")).collect();
    format!(
        "SELECT {} FROM {table} WHERE {} ORDER BY {} LIMIT 1",
        names.join(", "),
        not_null.join(" AND "),
        order.join(", ")
    )
}

/// Row count the catalog keeps for a stream's table, without scanning it
///
/// Reads `duckdb_tables()`; views and sources without statistics have no row.
pub fn estimated_rows(
    stream: &StreamKey,
    catalog: Option<&str>,
    default_schema: Option<&str>,
) -> String {
    let database = catalog.map_or_else(|| "current_database()".to_string(), quote_literal);
    let mut query = format!(
        "SELECT estimated_size FROM duckdb_tables() WHERE database_name = {database} AND table_name = {}",
        quote_literal(&stream.name)
    );
    if let Some(schema) = stream.namespace.as_deref().or(default_schema) {
        let _ = write!(query, " AND schema_name = {}", quote_literal(schema));
    }
    query.push_str(" LIMIT 1");
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldType;
    use pretty_assertions::assert_eq;

    fn field(name: &str) -> Field {
        Field::new(name, FieldType::Integer)
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(literal(&CursorValue::String("o'brien".into())), "'o''brien'");
        assert_eq!(literal(&CursorValue::Boolean(true)), "TRUE");
    }

    #[test]
    fn test_table_name() {
        let key = StreamKey::new("users");
        assert_eq!(
            table_name(&key, Some("source_db"), Some("public")),
            "\"source_db\".\"public\".\"users\""
        );
        let key = StreamKey::with_namespace("sales", "orders");
        assert_eq!(table_name(&key, None, None), "\"sales\".\"orders\"");
    }

    #[test]
    fn test_bounded_select() {
        let query = SelectQuery::new(StreamKey::new("t"), vec![field("a"), field("b")])
            .with_order_by(vec![field("a"), field("b")])
            .with_bounds(
                Some(vec![CursorValue::Integer(1), CursorValue::Integer(2)]),
                Some(vec![CursorValue::Integer(5), CursorValue::Integer(0)]),
            );
        assert_eq!(
            select(&query, "t"),
            "SELECT \"a\", \"b\" FROM t WHERE \
             ((\"a\" > 1) OR (\"a\" = 1 AND \"b\" > 2)) AND \
             ((\"a\" < 5) OR (\"a\" = 5 AND \"b\" < 0) OR (\"a\" = 5 AND \"b\" = 0)) \
             ORDER BY \"a\" ASC NULLS FIRST, \"b\" ASC NULLS FIRST"
        );
    }

    #[test]
    fn test_sampling_select() {
        let query = SelectQuery::new(StreamKey::new("t"), vec![field("id")])
            .with_order_by(vec![field("id")])
            .with_sample_rate(0.25)
            .with_limit(100);
        assert_eq!(
            select(&query, "t"),
            "SELECT \"id\" FROM t WHERE random() < 0.25 ORDER BY \"id\" ASC NULLS FIRST LIMIT 100"
        );
    }

    #[test]
    fn test_estimated_rows() {
        assert_eq!(
            estimated_rows(&StreamKey::new("users"), None, None),
            "SELECT estimated_size FROM duckdb_tables() WHERE database_name = current_database() \
             AND table_name = 'users' LIMIT 1"
        );
        assert_eq!(
            estimated_rows(&StreamKey::new("users"), Some("source_db"), Some("public")),
            "SELECT estimated_size FROM duckdb_tables() WHERE database_name = 'source_db' \
             AND table_name = 'users' AND schema_name = 'public' LIMIT 1"
        );
    }

    #[test]
    fn test_max_tuple() {
        assert_eq!(
            max_tuple(&[field("id")], "t"),
            "SELECT \"id\" FROM t WHERE \"id\" IS NOT NULL ORDER BY \"id\" DESC LIMIT 1"
        );
    }
}
