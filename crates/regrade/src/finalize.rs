//! Gated destructive schema changes.
//!
//! Phase 1 of a migration is additive and non-blocking; phase 2 promotes
//! optional columns to mandatory and drops superseded structure. Phase 2 is
//! only allowed once its [`Gate`] holds, so a partially-completed backfill
//! never leaves the schema rejecting valid existing data. A failed gate is
//! surfaced as [`Error::FinalizationBlocked`]; the engine never auto-resolves
//! it.

use crate::{Error, Result, quote_ident};
use tokio_postgres::GenericClient;
use tracing::{info, warn};

/// A completeness predicate guarding a destructive change.
///
/// `blocking_sql` counts the rows that still prevent the change (unmatched
/// backfill rows, NULLs in a column about to become mandatory, duplicate
/// slugs before a unique index). The gate holds when the count is zero.
#[derive(Debug, Clone, Copy)]
pub struct Gate<'a> {
    pub description: &'a str,
    pub blocking_sql: &'a str,
}

impl Gate<'_> {
    /// Count the rows currently blocking this gate.
    pub async fn blocked_rows<C: GenericClient>(&self, client: &C) -> Result<u64> {
        let row = client.query_one(self.blocking_sql, &[]).await?;
        let n: i64 = row.get(0);
        Ok(n.max(0) as u64)
    }

    /// Error unless the gate holds.
    pub async fn check<C: GenericClient>(&self, client: &C) -> Result<()> {
        let blocked_rows = self.blocked_rows(client).await?;
        if blocked_rows > 0 {
            warn!(
                gate = self.description,
                blocked_rows, "finalization refused"
            );
            return Err(Error::FinalizationBlocked {
                description: self.description.to_string(),
                blocked_rows,
            });
        }
        Ok(())
    }
}

/// Promote a column from optional to mandatory, once `gate` holds.
pub async fn promote_not_null<C: GenericClient>(
    client: &C,
    table: &str,
    column: &str,
    gate: &Gate<'_>,
) -> Result<()> {
    gate.check(client).await?;
    let sql = format!(
        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
        quote_ident(table),
        quote_ident(column),
    );
    client.execute(&sql, &[]).await?;
    info!(table, column, "column promoted to NOT NULL");
    Ok(())
}

/// Drop a superseded column, once `gate` holds.
///
/// Dependent constraint and index names, if any, must be dropped first via
/// [`drop_constraint_if_exists`] / [`drop_index_if_exists`]; this only
/// removes the column itself (`IF EXISTS`, so re-running is a no-op).
pub async fn drop_column<C: GenericClient>(
    client: &C,
    table: &str,
    column: &str,
    gate: &Gate<'_>,
) -> Result<()> {
    gate.check(client).await?;
    let sql = format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {}",
        quote_ident(table),
        quote_ident(column),
    );
    client.execute(&sql, &[]).await?;
    info!(table, column, "column dropped");
    Ok(())
}

/// Drop a superseded table, once `gate` holds.
pub async fn drop_table<C: GenericClient>(client: &C, table: &str, gate: &Gate<'_>) -> Result<()> {
    gate.check(client).await?;
    let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table));
    client.execute(&sql, &[]).await?;
    info!(table, "table dropped");
    Ok(())
}

/// Drop a constraint if present. Structural no-op when already gone.
pub async fn drop_constraint_if_exists<C: GenericClient>(
    client: &C,
    table: &str,
    constraint: &str,
) -> Result<()> {
    let sql = format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
        quote_ident(table),
        quote_ident(constraint),
    );
    client.execute(&sql, &[]).await?;
    Ok(())
}

/// Drop an index if present. Structural no-op when already gone.
pub async fn drop_index_if_exists<C: GenericClient>(client: &C, index: &str) -> Result<()> {
    let sql = format!("DROP INDEX IF EXISTS {}", quote_ident(index));
    client.execute(&sql, &[]).await?;
    Ok(())
}
