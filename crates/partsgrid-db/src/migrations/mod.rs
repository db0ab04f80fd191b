//! The ordered migration pipeline.
//!
//! Forward order:
//!
//! 1. baseline legacy schema (shared `products` catalog, `shop_products` as
//!    thin stock/price overlays, `order_items` keyed by product + shop)
//! 2. shop-product autonomy: descriptive columns land on `shop_products`
//!    with placeholder defaults (additive)
//! 3. enrichment backfill from the legacy catalog + slug rebuild
//! 4. order-item re-key: `shop_product_id` column + heuristic backfill
//! 5. finalization: NOT NULL promotions, unique slug backstop, legacy
//!    column drops (destructive, gated)
//! 6. vehicles, vehicle models, ordered product images (additive)
//! 7. drop of the superseded single-image column (destructive, gated)
//! 8. compatibility moves from vehicle level to vehicle-model level
//!
//! Additive and destructive steps are separate migrations throughout, so a
//! partially-run pipeline never rejects valid existing data and the operator
//! can `verify` between phases.

mod m2024_10_01_000000_baseline_schema;
mod m2024_11_13_120000_shop_product_autonomy;
mod m2024_11_20_090000_enrich_shop_products;
mod m2024_12_01_090000_rekey_order_items;
mod m2024_12_15_100000_finalize_autonomy;
mod m2026_01_03_120000_vehicles_and_images;
mod m2026_01_05_100000_drop_legacy_image_column;
mod m2026_01_09_140000_vehicle_model_compat;

use regrade::Gate;

/// Sentinel name for shop products created before enrichment.
///
/// Distinguishes "not yet enriched" rows from genuinely named ones; every
/// backfill predicate and finalization gate keys off it.
pub const PLACEHOLDER_NAME: &str = "Unknown Product";

/// Sentinel slug matching [`PLACEHOLDER_NAME`].
pub const PLACEHOLDER_SLUG: &str = "unknown-product";

/// Holds once every shop product has been enriched past the placeholder.
pub const ENRICHED_GATE: Gate<'static> = Gate {
    description: "shop products still carrying the 'Unknown Product' placeholder",
    blocking_sql: "SELECT count(*) FROM shop_products WHERE name = 'Unknown Product'",
};

/// Holds once every shop product has a price.
pub const PRICED_GATE: Gate<'static> = Gate {
    description: "shop products without a price",
    blocking_sql: "SELECT count(*) FROM shop_products WHERE price IS NULL",
};

/// Holds once every order item has been re-keyed to a shop product.
pub const REKEYED_GATE: Gate<'static> = Gate {
    description: "order items not yet re-keyed to a shop product",
    blocking_sql: "SELECT count(*) FROM order_items WHERE shop_product_id IS NULL",
};

/// Holds once no shop shares a slug between two of its products.
pub const UNIQUE_SLUG_GATE: Gate<'static> = Gate {
    description: "duplicate (shop, slug) pairs",
    blocking_sql: r#"
        SELECT count(*) FROM (
            SELECT 1 FROM shop_products
            GROUP BY shop_id, slug
            HAVING count(*) > 1
        ) dup
    "#,
};

/// One-time snapshot of product and shop names onto re-keyed items.
///
/// Guarded by `product_name IS NULL`: once written, a snapshot is never
/// refreshed from the live catalog. Runs during the re-key migration and
/// again at finalization, so items re-keyed by hand between the two still
/// get their snapshots.
pub(crate) const SNAPSHOT_NAMES: &str = r#"
UPDATE order_items oi
SET product_name = sp.name,
    shop_name = s.name
FROM shop_products sp
JOIN shops s ON s.id = sp.shop_id
WHERE sp.id = oi.shop_product_id
  AND oi.product_name IS NULL
"#;

/// Count of order items with no re-key candidate at all.
pub const UNMATCHED_ORDER_ITEMS_SQL: &str = r#"
SELECT count(*)
FROM order_items oi
WHERE oi.shop_product_id IS NULL
  AND NOT EXISTS (
      SELECT 1
      FROM shop_products sp
      JOIN products p ON p.id = oi.product_id
      WHERE sp.shop_id = oi.shop_id
        AND (p.name = sp.name
             OR (p.oe_number IS NOT NULL AND p.oe_number = sp.oe_number))
  )
"#;

/// Count of order items with more than one re-key candidate.
pub const AMBIGUOUS_ORDER_ITEMS_SQL: &str = r#"
SELECT count(*)
FROM (
    SELECT oi.id
    FROM order_items oi
    JOIN shop_products sp ON sp.shop_id = oi.shop_id
    JOIN products p ON p.id = oi.product_id
    WHERE oi.shop_product_id IS NULL
      AND (p.name = sp.name
           OR (p.oe_number IS NOT NULL AND p.oe_number = sp.oe_number))
    GROUP BY oi.id
    HAVING count(*) > 1
) ambiguous
"#;
