//! Versioned migration runner.
//!
//! Migrations are static [`Migration`] values registered with `inventory`
//! (usually through [`register_migration!`](crate::register_migration)).
//! [`MigrationRunner`] executes pending migrations in version order, each in
//! its own transaction, and records applied versions in the
//! `_regrade_migrations` ledger table so partial application is always
//! inspectable and re-invocation is safe.

use crate::{Error, MigrationFn, Result};
use tokio_postgres::{Client, Transaction};
use tracing::{info, warn};

/// SQL to create the migration ledger table.
const CREATE_LEDGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _regrade_migrations (
    version TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Which half of the two-phase protocol a migration belongs to.
///
/// Additive migrations only widen the schema (new tables, new nullable or
/// defaulted columns, new indexes) and never reject existing data.
/// Destructive migrations promote columns to mandatory or drop superseded
/// structure, and must sit behind [`Gate`](crate::finalize::Gate) checks.
/// The two are never combined in one migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Additive,
    Destructive,
}

/// A registered migration.
pub struct Migration {
    /// Version string, e.g. "2024_11_13_120000"
    pub version: &'static str,
    /// Human-readable name, e.g. "shop-product-autonomy"
    pub name: &'static str,
    /// Additive or destructive (see [`Phase`]).
    pub phase: Phase,
    /// Applies the migration.
    pub apply: MigrationFn,
    /// Restores the previous schema shape, if possible.
    pub revert: Option<MigrationFn>,
    /// Data discarded by `revert`, spelled out for the operator.
    ///
    /// When set, [`MigrationRunner::revert`] refuses to run unless
    /// [`RevertOptions::allow_data_loss`] is set, so the loss is surfaced
    /// before execution rather than discovered after.
    pub revert_note: Option<&'static str>,
}

/// Options for [`MigrationRunner::revert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RevertOptions {
    /// Accept reverts that discard data with no preimage in the old schema.
    pub allow_data_loss: bool,
}

/// Context passed to migration functions.
///
/// Wraps a database transaction, ensuring all migration operations are atomic.
pub struct MigrationContext<'a> {
    tx: &'a Transaction<'a>,
}

impl<'a> MigrationContext<'a> {
    pub fn new(tx: &'a Transaction<'a>) -> Self {
        Self { tx }
    }

    /// Execute a SQL statement.
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        Ok(self.tx.execute(sql, &[]).await?)
    }

    /// Execute a SQL statement with parameters.
    pub async fn execute_params(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64> {
        Ok(self.tx.execute(sql, params).await?)
    }

    /// Run a `SELECT count(*)`-style query and return the count.
    pub async fn count(&self, sql: &str) -> Result<i64> {
        let row = self.tx.query_one(sql, &[]).await?;
        Ok(row.get(0))
    }

    /// Add a column unless the table already has it.
    ///
    /// `definition` is everything after the column name, e.g.
    /// `"TEXT NOT NULL DEFAULT 'Unknown Product'"`. Non-nullable columns must
    /// carry a default so existing rows stay valid without a blocking
    /// backfill. Returns whether the column was added.
    pub async fn add_column_if_absent(
        &self,
        table: &str,
        column: &str,
        definition: &str,
    ) -> Result<bool> {
        if crate::guard::column_exists(self.tx, table, column).await? {
            return Ok(false);
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            crate::quote_ident(table),
            crate::quote_ident(column),
            definition
        );
        self.tx.execute(&sql, &[]).await?;
        Ok(true)
    }

    /// Create an index unless one with the same name already exists.
    ///
    /// `sql` is the full `CREATE [UNIQUE] INDEX ...` statement. Returns
    /// whether the index was created.
    pub async fn create_index_if_absent(&self, index: &str, sql: &str) -> Result<bool> {
        if crate::guard::index_exists(self.tx, index).await? {
            return Ok(false);
        }
        self.tx.execute(sql, &[]).await?;
        Ok(true)
    }

    /// Get the underlying transaction for complex operations.
    pub fn transaction(&self) -> &Transaction<'a> {
        self.tx
    }
}

/// All registered migrations, sorted by version.
pub fn registered() -> Vec<&'static Migration> {
    let mut migrations: Vec<_> = inventory::iter::<Migration>.into_iter().collect();
    migrations.sort_by_key(|m| m.version);
    migrations
}

/// Runs migrations against a database.
pub struct MigrationRunner<'a> {
    client: &'a mut Client,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    /// Ensure the migration ledger table exists.
    pub async fn init(&self) -> Result<()> {
        self.client.execute(CREATE_LEDGER_TABLE, &[]).await?;
        Ok(())
    }

    /// Get all applied migration versions, oldest first.
    pub async fn applied(&self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT version FROM _regrade_migrations ORDER BY version",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    /// Get all pending migrations (registered but not applied).
    pub fn pending(&self, applied: &[String]) -> Vec<&'static Migration> {
        registered()
            .into_iter()
            .filter(|m| !applied.iter().any(|v| v == m.version))
            .collect()
    }

    /// Run all pending migrations.
    ///
    /// Each migration runs in its own transaction, with the ledger row
    /// inserted inside that same transaction. If a migration fails, its
    /// changes are rolled back and subsequent migrations are skipped.
    pub async fn migrate(&mut self) -> Result<Vec<&'static str>> {
        self.migrate_to(None).await
    }

    /// Run pending migrations up to and including `upto` (all when `None`).
    ///
    /// Lets an operator stop before a destructive phase, review the
    /// diagnostics, and continue.
    pub async fn migrate_to(&mut self, upto: Option<&str>) -> Result<Vec<&'static str>> {
        self.init().await?;
        let applied = self.applied().await?;
        let mut pending = self.pending(&applied);
        if let Some(limit) = upto {
            pending.retain(|m| m.version <= limit);
        }

        let mut ran = Vec::new();
        for migration in pending {
            info!(
                version = migration.version,
                name = migration.name,
                "applying migration"
            );
            let tx = self.client.transaction().await?;

            let ctx = MigrationContext::new(&tx);
            (migration.apply)(&ctx).await?;

            tx.execute(
                "INSERT INTO _regrade_migrations (version, name) VALUES ($1, $2)",
                &[&migration.version, &migration.name],
            )
            .await?;

            tx.commit().await?;

            ran.push(migration.version);
        }

        Ok(ran)
    }

    /// Revert up to `steps` applied migrations, newest first.
    ///
    /// A migration without a revert function stops with
    /// [`Error::IrreversibleMigration`]. A migration whose revert discards
    /// data stops with [`Error::LossyRevert`] unless
    /// [`RevertOptions::allow_data_loss`] is set.
    pub async fn revert(&mut self, steps: usize, options: RevertOptions) -> Result<Vec<&'static str>> {
        self.init().await?;
        let mut applied = self.applied().await?;
        applied.reverse();

        let mut reverted = Vec::new();
        for version in applied.into_iter().take(steps) {
            let Some(migration) = registered().into_iter().find(|m| m.version == version) else {
                return Err(Error::Migration(format!(
                    "applied version {version} has no registered migration"
                )));
            };
            let Some(revert) = migration.revert else {
                return Err(Error::IrreversibleMigration { version });
            };
            if let Some(note) = migration.revert_note {
                if !options.allow_data_loss {
                    return Err(Error::LossyRevert {
                        version,
                        note: note.to_string(),
                    });
                }
                warn!(
                    version = migration.version,
                    note, "reverting with data loss"
                );
            }

            info!(
                version = migration.version,
                name = migration.name,
                "reverting migration"
            );
            let tx = self.client.transaction().await?;
            let ctx = MigrationContext::new(&tx);
            revert(&ctx).await?;
            tx.execute(
                "DELETE FROM _regrade_migrations WHERE version = $1",
                &[&migration.version],
            )
            .await?;
            tx.commit().await?;

            reverted.push(migration.version);
        }

        Ok(reverted)
    }

    /// Get status of all registered migrations.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.init().await?;
        let applied = self.applied().await?;

        Ok(registered()
            .into_iter()
            .map(|m| MigrationStatus {
                version: m.version,
                name: m.name,
                phase: m.phase,
                applied: applied.iter().any(|v| v == m.version),
                reversible: m.revert.is_some(),
                revert_note: m.revert_note,
            })
            .collect())
    }
}

/// Status of a single migration.
pub struct MigrationStatus {
    pub version: &'static str,
    pub name: &'static str,
    pub phase: Phase,
    pub applied: bool,
    pub reversible: bool,
    pub revert_note: Option<&'static str>,
}
