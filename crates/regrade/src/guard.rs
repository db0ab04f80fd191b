//! Existence checks for idempotent structural changes.
//!
//! Every structural delta (new column, new table, new index, new constraint)
//! is guarded by one of these checks before it runs, so re-applying a delta
//! against an already-migrated schema is a no-op rather than an error. The
//! checks query `information_schema` and `pg_indexes` in the `public`
//! schema, the same catalogs introspection tools read.

use crate::Result;
use tokio_postgres::GenericClient;

/// Does a base table with this name exist?
pub async fn table_exists<C: GenericClient>(client: &C, table: &str) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public'
                  AND table_type = 'BASE TABLE'
                  AND table_name = $1
            )
            "#,
            &[&table],
        )
        .await?;
    Ok(row.get(0))
}

/// Does this table have a column with this name?
pub async fn column_exists<C: GenericClient>(
    client: &C,
    table: &str,
    column: &str,
) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = 'public'
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
            &[&table, &column],
        )
        .await?;
    Ok(row.get(0))
}

/// Does an index with this name exist?
pub async fn index_exists<C: GenericClient>(client: &C, index: &str) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_indexes
                WHERE schemaname = 'public'
                  AND indexname = $1
            )
            "#,
            &[&index],
        )
        .await?;
    Ok(row.get(0))
}

/// Does this table have a constraint with this name?
pub async fn constraint_exists<C: GenericClient>(
    client: &C,
    table: &str,
    constraint: &str,
) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.table_constraints
                WHERE table_schema = 'public'
                  AND table_name = $1
                  AND constraint_name = $2
            )
            "#,
            &[&table, &constraint],
        )
        .await?;
    Ok(row.get(0))
}

/// Is this column nullable? Errors if the column does not exist.
pub async fn column_is_nullable<C: GenericClient>(
    client: &C,
    table: &str,
    column: &str,
) -> Result<bool> {
    let row = client
        .query_one(
            r#"
            SELECT is_nullable = 'YES'
            FROM information_schema.columns
            WHERE table_schema = 'public'
              AND table_name = $1
              AND column_name = $2
            "#,
            &[&table, &column],
        )
        .await?;
    Ok(row.get(0))
}
