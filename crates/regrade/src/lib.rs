//! Postgres schema-evolution toolkit.
//!
//! `regrade` turns a pile of ad-hoc migration scripts into an ordered,
//! versioned pipeline:
//!
//! - Migrations are static [`Migration`] values with an `apply` function and
//!   an optional `revert`, registered with [`inventory`] and executed in
//!   version order by [`MigrationRunner`], which records applied versions in
//!   a ledger table.
//! - Structural changes go through existence guards ([`guard`]) so re-running
//!   an already-applied delta is a no-op rather than an error.
//! - Bulk data repair is expressed as pluggable [`backfill::MatchRule`]s,
//!   executed as single set-based statements that report how many rows were
//!   updated, how many have no candidate, and how many are ambiguous.
//! - Destructive changes (NOT NULL promotion, column/table drops) are gated
//!   behind [`finalize::Gate`]s and refuse to run while repair is incomplete.
//! - Per-tenant human-readable identifiers come from the [`slug`] allocator
//!   instead of a database trigger, so the probing logic is testable on its
//!   own.
//!
//! # Migrations
//!
//! Each migration lives in its own file and registers itself:
//!
//! ```ignore
//! async fn apply(ctx: &MigrationContext<'_>) -> regrade::Result<()> {
//!     ctx.execute("CREATE TABLE IF NOT EXISTS shop (id UUID PRIMARY KEY)")
//!         .await?;
//!     Ok(())
//! }
//!
//! regrade::register_migration! {
//!     version: "2024_10_01_000000",
//!     name: "create-shop",
//!     phase: Phase::Additive,
//!     apply: apply,
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod backfill;
mod error;
pub mod finalize;
pub mod guard;
mod migrate;
pub mod slug;
pub mod verify;

pub use backfill::{BackfillOutcome, MatchRule, run_backfill};
pub use error::Error;
pub use finalize::Gate;
pub use migrate::{
    Migration, MigrationContext, MigrationRunner, MigrationStatus, Phase, RevertOptions,
};
pub use slug::{SlugScope, is_unique_violation, slugify};

// Re-export inventory so downstream crates don't need a direct dependency
// just to register migrations.
pub use inventory;

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Result type for regrade operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Type alias for migration functions.
///
/// Migration functions are async functions that take a reference to a
/// [`MigrationContext`] and return `Result<()>`. The context wraps the
/// transaction the migration runs in.
pub type MigrationFn =
    for<'a> fn(&'a MigrationContext<'a>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

// Register Migration with inventory
inventory::collect!(Migration);

/// Register a migration with the global registry.
///
/// Wraps the async function in the boxing shim [`MigrationFn`] expects and
/// submits the [`Migration`] to inventory. `revert` and `revert_note` are
/// optional; a migration without `revert` is refused by
/// [`MigrationRunner::revert`], and one with a `revert_note` is refused
/// unless the operator explicitly accepts the data loss it describes.
#[macro_export]
macro_rules! register_migration {
    (
        version: $version:literal,
        name: $name:literal,
        phase: $phase:expr,
        apply: $apply:ident
        $(, revert: $revert:ident)?
        $(, revert_note: $note:literal)?
        $(,)?
    ) => {
        $crate::inventory::submit! {
            $crate::Migration {
                version: $version,
                name: $name,
                phase: $phase,
                apply: |ctx| Box::pin($apply(ctx)),
                revert: $crate::register_migration!(@revert $($revert)?),
                revert_note: $crate::register_migration!(@note $($note)?),
            }
        }
    };
    (@revert $revert:ident) => {
        Some(|ctx| Box::pin($revert(ctx)))
    };
    (@revert) => {
        None
    };
    (@note $note:literal) => {
        Some($note)
    };
    (@note) => {
        None
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("shop_products"), "\"shop_products\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
