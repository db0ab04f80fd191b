//! Tenant-scoped slug allocation.
//!
//! Replaces a database-side trigger with an explicit allocator invoked by the
//! write path before commit, so the probing logic is testable independent of
//! the storage engine. Uniqueness is only guaranteed within one scope (a
//! tenant partition such as a shop); nothing is enforced across scopes.
//!
//! The probe-then-insert sequence has a race window between the uniqueness
//! probe and the eventual write when two allocations for the same scope run
//! concurrently. The discipline is: allocate and insert inside one
//! transaction, back the scope with a unique constraint, and retry the whole
//! write on [`is_unique_violation`] (optimistic retry, no pessimistic
//! locking).

use crate::{Result, quote_ident};
use tokio_postgres::GenericClient;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

/// Fallback base when a name slugifies to nothing (e.g. `"!!!"`).
const EMPTY_NAME_FALLBACK: &str = "untitled";

/// Derive a URL-safe slug from a human-readable name.
///
/// Strips characters outside `[A-Za-z0-9\s]`, trims, lower-cases, and
/// collapses whitespace runs to single hyphens. Mirrors what the slug rebuild
/// statements do in SQL, so allocator output and bulk-rebuilt slugs agree.
pub fn slugify(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(cleaned.len());
    for word in cleaned.split_whitespace() {
        if !slug.is_empty() {
            slug.push('-');
        }
        for c in word.chars() {
            slug.push(c.to_ascii_lowercase());
        }
    }
    slug
}

/// The tenant partition a slug must be unique within.
///
/// Example: shop products are scoped per shop:
///
/// ```ignore
/// const SHOP_PRODUCT_SLUGS: SlugScope<'_> = SlugScope {
///     table: "shop_products",
///     scope_column: "shop_id",
///     slug_column: "slug",
///     id_column: "id",
/// };
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SlugScope<'a> {
    pub table: &'a str,
    pub scope_column: &'a str,
    pub slug_column: &'a str,
    pub id_column: &'a str,
}

impl SlugScope<'_> {
    fn probe_sql(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1 AND {} = $2 AND ($3::uuid IS NULL OR {} <> $3))",
            quote_ident(self.table),
            quote_ident(self.scope_column),
            quote_ident(self.slug_column),
            quote_ident(self.id_column),
        )
    }
}

/// Allocate a slug unique within `scope_id`'s partition.
///
/// If `candidate_slug` is empty or absent, the base is derived from `name`
/// via [`slugify`]. Starting from the base, probes for an existing row with
/// the same `(scope, slug)` whose id differs from `exclude_id` (pass the
/// row's own id on update so it doesn't collide with itself), appending `-N`
/// with `N` starting at 1 until no collision remains.
///
/// The result is unique at the instant of allocation; the caller must
/// persist it in the same transaction and retry on unique violation.
pub async fn allocate<C: GenericClient>(
    client: &C,
    scope: &SlugScope<'_>,
    scope_id: &Uuid,
    name: &str,
    candidate_slug: Option<&str>,
    exclude_id: Option<Uuid>,
) -> Result<String> {
    let base = match candidate_slug.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => slugify(name),
    };
    let base = if base.is_empty() {
        EMPTY_NAME_FALLBACK.to_string()
    } else {
        base
    };

    let sql = scope.probe_sql();
    let mut slug = base.clone();
    let mut n = 1u64;
    loop {
        let row = client
            .query_one(&sql, &[scope_id, &slug, &exclude_id])
            .await?;
        let taken: bool = row.get(0);
        if !taken {
            return Ok(slug);
        }
        slug = format!("{base}-{n}");
        n += 1;
    }
}

/// Is this the scope's unique constraint firing?
///
/// Used by write paths to decide whether a failed insert should be retried
/// with a freshly allocated slug.
pub fn is_unique_violation(err: &crate::Error) -> bool {
    match err {
        crate::Error::Postgres(e) => e.code() == Some(&SqlState::UNIQUE_VIOLATION),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_strips_punctuation() {
        assert_eq!(slugify("Oil Filter!!"), "oil-filter");
        assert_eq!(slugify("Brake Pad (front)"), "brake-pad-front");
    }

    #[test]
    fn test_slugify_collapses_whitespace() {
        assert_eq!(slugify("  Spark\t Plug   Set "), "spark-plug-set");
    }

    #[test]
    fn test_slugify_keeps_digits() {
        assert_eq!(slugify("OE 06A-115-561B"), "oe-06a115561b");
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_probe_sql_quotes_identifiers() {
        let scope = SlugScope {
            table: "shop_products",
            scope_column: "shop_id",
            slug_column: "slug",
            id_column: "id",
        };
        let sql = scope.probe_sql();
        assert!(sql.contains("\"shop_products\""));
        assert!(sql.contains("\"shop_id\" = $1"));
        assert!(sql.contains("\"slug\" = $2"));
    }
}
