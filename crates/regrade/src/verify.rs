//! Read-only diagnostics run between migration phases.
//!
//! Forward migrations end with these checks so an operator can review row
//! counts, unmatched counts, and duplicate slugs before the destructive
//! phase runs. They never modify data; they are the required manual gate
//! between phase 1 and phase 2.

use crate::{Result, quote_ident};
use tokio_postgres::GenericClient;

/// Total rows in a table.
pub async fn row_count<C: GenericClient>(client: &C, table: &str) -> Result<i64> {
    let sql = format!("SELECT count(*) FROM {}", quote_ident(table));
    let row = client.query_one(&sql, &[]).await?;
    Ok(row.get(0))
}

/// A `(scope, slug)` pair held by more than one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSlug {
    /// The scope value, rendered as text.
    pub scope: String,
    pub slug: String,
    pub count: i64,
}

/// Find `(scope, slug)` pairs that violate per-scope uniqueness.
///
/// Must come back empty before a unique backstop index can be created on
/// the pair.
pub async fn duplicate_slugs<C: GenericClient>(
    client: &C,
    table: &str,
    scope_column: &str,
    slug_column: &str,
) -> Result<Vec<DuplicateSlug>> {
    let sql = format!(
        r#"
        SELECT {scope}::text, {slug}, count(*)
        FROM {table}
        GROUP BY {scope}, {slug}
        HAVING count(*) > 1
        ORDER BY count(*) DESC, {slug}
        "#,
        table = quote_ident(table),
        scope = quote_ident(scope_column),
        slug = quote_ident(slug_column),
    );
    let rows = client.query(&sql, &[]).await?;
    Ok(rows
        .iter()
        .map(|r| DuplicateSlug {
            scope: r.get(0),
            slug: r.get(1),
            count: r.get(2),
        })
        .collect())
}

/// Count rows matching an arbitrary diagnostic query.
///
/// The query must return a single row whose first column is a count, e.g.
/// the `blocking_sql` of a [`Gate`](crate::finalize::Gate) so status output
/// can show how far a gate is from holding.
pub async fn pending_count<C: GenericClient>(client: &C, sql: &str) -> Result<i64> {
    let row = client.query_one(sql, &[]).await?;
    Ok(row.get(0))
}
