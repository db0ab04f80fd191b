//! Migration: enrich-shop-products
//!
//! Backfills the autonomy columns from the legacy shared catalog. A shop
//! product is enriched from the product its `product_id` still points at,
//! but only while its name is the placeholder, so re-runs never clobber a
//! shop manager's manual edits. Afterwards the placeholder slugs are rebuilt
//! from the enriched names, deduplicated per shop with the same `-N`
//! suffix scheme the allocator uses.

use regrade::{MatchRule, MigrationContext, Phase, Result, run_backfill};

use super::{PLACEHOLDER_NAME, PLACEHOLDER_SLUG};

/// Exact-key enrichment from the legacy catalog link.
///
/// Not a heuristic: `product_id` is a foreign key, so ambiguity is
/// impossible and only rows whose linked product is itself unusable stay
/// unmatched.
pub struct LegacyProductEnrichment;

impl MatchRule for LegacyProductEnrichment {
    fn description(&self) -> &str {
        "shop-product enrichment from legacy catalog"
    }

    fn update_sql(&self) -> String {
        format!(
            r#"
UPDATE shop_products sp
SET name = p.name,
    description = p.description,
    technical_details = p.technical_details,
    oe_number = p.oe_number,
    brand = p.brand,
    manufacturer = p.manufacturer,
    model = p.model,
    manufacturer_year = p.manufacturer_year,
    weight = p.weight,
    dimensions = p.dimensions,
    image = p.image,
    price = COALESCE(sp.price, p.price),
    updated_at = now()
FROM products p
WHERE p.id = sp.product_id
  AND sp.name = '{PLACEHOLDER_NAME}'
"#
        )
    }

    fn unmatched_sql(&self) -> String {
        format!("SELECT count(*) FROM shop_products WHERE name = '{PLACEHOLDER_NAME}'")
    }
}

/// Rebuild placeholder slugs from enriched names, set-based.
///
/// Mirrors `regrade::slug::slugify` in SQL; `row_number()` per
/// `(shop_id, base)` hands out the `-N` suffixes. Only rows still carrying
/// the placeholder slug are touched. Residual duplicates (e.g. names that
/// slugify to nothing) are caught by the finalization gate.
fn rebuild_slugs_sql() -> String {
    format!(
        r#"
UPDATE shop_products sp
SET slug = CASE WHEN d.rn = 1 THEN d.base ELSE d.base || '-' || (d.rn - 1) END,
    updated_at = now()
FROM (
    SELECT id, base,
           row_number() OVER (PARTITION BY shop_id, base ORDER BY created_at, id) AS rn
    FROM (
        SELECT id, shop_id, created_at,
               NULLIF(
                   regexp_replace(
                       lower(trim(regexp_replace(name, '[^a-zA-Z0-9\s]', '', 'g'))),
                       '\s+', '-', 'g'
                   ),
                   ''
               ) AS base
        FROM shop_products
    ) bases
    WHERE base IS NOT NULL
) d
WHERE sp.id = d.id
  AND sp.slug = '{PLACEHOLDER_SLUG}'
"#
    )
}

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    let outcome = run_backfill(ctx.transaction(), &LegacyProductEnrichment).await?;
    tracing::info!(
        updated = outcome.updated,
        unmatched = outcome.unmatched,
        "enrichment backfill"
    );

    let rebuilt = ctx.execute(&rebuild_slugs_sql()).await?;
    tracing::info!(rebuilt, "slugs rebuilt from enriched names");

    Ok(())
}

regrade::register_migration! {
    version: "2024_11_20_090000",
    name: "enrich-shop-products",
    phase: Phase::Additive,
    apply: apply,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_predicate_guards_enriched_rows() {
        let sql = LegacyProductEnrichment.update_sql();
        assert!(sql.contains("sp.name = 'Unknown Product'"));
        assert!(sql.contains("p.id = sp.product_id"));
    }

    #[test]
    fn test_slug_rebuild_only_touches_placeholder_slugs() {
        let sql = rebuild_slugs_sql();
        assert!(sql.contains("sp.slug = 'unknown-product'"));
        assert!(sql.contains("PARTITION BY shop_id, base"));
    }
}
