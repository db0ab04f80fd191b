//! Migration: rekey-order-items
//!
//! Adds `order_items.shop_product_id` and backfills it by matching the
//! legacy `(product_id, shop_id)` pair against the now-autonomous shop
//! products. The match is a best-effort heuristic, not an exact key join: a
//! candidate shop product shares the order item's shop and matches the
//! legacy product by name or OE number. Only order items with exactly one
//! candidate are written; ambiguous and unmatched rows are surfaced for
//! manual reconciliation and block the finalization migration.
//!
//! Also adds the purchase-time snapshot columns (`product_name`,
//! `shop_name`) so historical orders stop depending on live catalog rows.

use regrade::{MatchRule, MigrationContext, Phase, Result, run_backfill};

use super::{AMBIGUOUS_ORDER_ITEMS_SQL, SNAPSHOT_NAMES, UNMATCHED_ORDER_ITEMS_SQL};

/// Heuristic re-key of order items onto shop products.
pub struct OrderItemRekey;

impl MatchRule for OrderItemRekey {
    fn description(&self) -> &str {
        "order-item re-key onto shop products"
    }

    fn update_sql(&self) -> String {
        // HAVING count(*) = 1 restricts to unambiguous candidates; the
        // aggregate is only there to satisfy the GROUP BY.
        r#"
UPDATE order_items oi
SET shop_product_id = one.shop_product_id
FROM (
    SELECT oi2.id AS order_item_id,
           min(sp.id::text)::uuid AS shop_product_id
    FROM order_items oi2
    JOIN shop_products sp ON sp.shop_id = oi2.shop_id
    JOIN products p ON p.id = oi2.product_id
    WHERE oi2.shop_product_id IS NULL
      AND (p.name = sp.name
           OR (p.oe_number IS NOT NULL AND p.oe_number = sp.oe_number))
    GROUP BY oi2.id
    HAVING count(*) = 1
) one
WHERE oi.id = one.order_item_id
"#
        .to_string()
    }

    fn unmatched_sql(&self) -> String {
        UNMATCHED_ORDER_ITEMS_SQL.to_string()
    }

    fn ambiguous_sql(&self) -> Option<String> {
        Some(AMBIGUOUS_ORDER_ITEMS_SQL.to_string())
    }
}

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    // Nullable for now; promoted NOT NULL by the finalization migration
    // once the backfill is verifiably complete. No cascade: deleting a shop
    // product must not delete order history.
    ctx.add_column_if_absent(
        "order_items",
        "shop_product_id",
        "UUID REFERENCES shop_products (id)",
    )
    .await?;
    ctx.add_column_if_absent("order_items", "product_name", "TEXT").await?;
    ctx.add_column_if_absent("order_items", "shop_name", "TEXT").await?;
    ctx.create_index_if_absent(
        "idx_order_items_shop_product_id",
        "CREATE INDEX idx_order_items_shop_product_id ON order_items (shop_product_id)",
    )
    .await?;

    let outcome = run_backfill(ctx.transaction(), &OrderItemRekey).await?;
    tracing::info!(
        updated = outcome.updated,
        unmatched = outcome.unmatched,
        ambiguous = outcome.ambiguous,
        "order-item re-key backfill"
    );

    ctx.execute(SNAPSHOT_NAMES).await?;

    Ok(())
}

async fn revert(ctx: &MigrationContext<'_>) -> Result<()> {
    // Purely structural: the re-key is re-derivable from the legacy columns,
    // which are still present at this point in the pipeline.
    ctx.execute("DROP INDEX IF EXISTS idx_order_items_shop_product_id").await?;
    ctx.execute("ALTER TABLE order_items DROP COLUMN IF EXISTS shop_name").await?;
    ctx.execute("ALTER TABLE order_items DROP COLUMN IF EXISTS product_name").await?;
    ctx.execute("ALTER TABLE order_items DROP COLUMN IF EXISTS shop_product_id").await?;
    Ok(())
}

regrade::register_migration! {
    version: "2024_12_01_090000",
    name: "rekey-order-items",
    phase: Phase::Additive,
    apply: apply,
    revert: revert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_restricts_to_single_candidate() {
        let sql = OrderItemRekey.update_sql();
        assert!(sql.contains("HAVING count(*) = 1"));
        assert!(sql.contains("oi2.shop_product_id IS NULL"));
    }

    #[test]
    fn test_rule_separates_ambiguous_from_unmatched() {
        let ambiguous = OrderItemRekey.ambiguous_sql().unwrap();
        assert!(ambiguous.contains("HAVING count(*) > 1"));
        assert!(OrderItemRekey.unmatched_sql().contains("NOT EXISTS"));
    }

    #[test]
    fn test_snapshot_written_once() {
        assert!(SNAPSHOT_NAMES.contains("oi.product_name IS NULL"));
    }
}
