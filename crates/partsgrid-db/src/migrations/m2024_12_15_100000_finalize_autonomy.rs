//! Migration: finalize-autonomy
//!
//! Phase 2 of the autonomy move, destructive and gated. Refuses to run while
//! any backfill is incomplete: every gate failure aborts the whole migration
//! (it runs in one transaction), leaving the schema in its phase-1 shape for
//! the operator to reconcile and retry.
//!
//! Once through the gates: prices and re-keyed order items become mandatory,
//! the `(shop_id, slug)` pair gets its unique backstop index, and the legacy
//! key columns (`order_items.product_id`, `order_items.shop_id`,
//! `shop_products.product_id`) are dropped.

use regrade::{Gate, MigrationContext, Phase, Result, finalize, guard};

use super::{ENRICHED_GATE, PRICED_GATE, REKEYED_GATE, SNAPSHOT_NAMES, UNIQUE_SLUG_GATE};

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    let tx = ctx.transaction();

    // Items re-keyed by hand since the re-key migration ran have no
    // snapshots yet; the IS NULL guard leaves existing ones intact.
    ctx.execute(SNAPSHOT_NAMES).await?;

    ENRICHED_GATE.check(tx).await?;
    // PRICED_GATE holds whenever ENRICHED_GATE does (enrichment coalesces a
    // catalog price in), but check it on its own so a manually nulled price
    // is reported as what it is.
    finalize::promote_not_null(tx, "shop_products", "price", &PRICED_GATE).await?;

    if !guard::constraint_exists(tx, "shop_products", "shop_products_price_non_negative").await? {
        ctx.execute(
            "ALTER TABLE shop_products ADD CONSTRAINT shop_products_price_non_negative CHECK (price >= 0)",
        )
        .await?;
    }

    // Unique backstop for the allocator's probe-then-insert race.
    UNIQUE_SLUG_GATE.check(tx).await?;
    ctx.create_index_if_absent(
        "ux_shop_products_shop_slug",
        "CREATE UNIQUE INDEX ux_shop_products_shop_slug ON shop_products (shop_id, slug)",
    )
    .await?;
    // Superseded by the unique index on the same pair.
    finalize::drop_index_if_exists(tx, "idx_shop_products_shop_slug").await?;

    finalize::promote_not_null(tx, "order_items", "shop_product_id", &REKEYED_GATE).await?;

    finalize::drop_constraint_if_exists(tx, "order_items", "order_items_product_id_fkey").await?;
    finalize::drop_constraint_if_exists(tx, "order_items", "order_items_shop_id_fkey").await?;
    finalize::drop_column(tx, "order_items", "product_id", &REKEYED_GATE).await?;
    finalize::drop_column(tx, "order_items", "shop_id", &REKEYED_GATE).await?;

    finalize::drop_constraint_if_exists(tx, "shop_products", "shop_products_product_id_fkey")
        .await?;
    finalize::drop_index_if_exists(tx, "idx_shop_products_product_id").await?;
    finalize::drop_column(tx, "shop_products", "product_id", &ENRICHED_GATE).await?;

    ctx.execute(
        "COMMENT ON TABLE shop_products IS 'Autonomous shop products; no longer dependent on the shared products catalog'",
    )
    .await?;

    Ok(())
}

async fn revert(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute("ALTER TABLE shop_products ALTER COLUMN price DROP NOT NULL").await?;
    ctx.execute(
        "ALTER TABLE shop_products DROP CONSTRAINT IF EXISTS shop_products_price_non_negative",
    )
    .await?;
    ctx.execute("DROP INDEX IF EXISTS ux_shop_products_shop_slug").await?;
    ctx.create_index_if_absent(
        "idx_shop_products_shop_slug",
        "CREATE INDEX idx_shop_products_shop_slug ON shop_products (shop_id, slug)",
    )
    .await?;

    ctx.execute("ALTER TABLE order_items ALTER COLUMN shop_product_id DROP NOT NULL").await?;

    // The legacy key columns come back nullable. The shop reference is
    // recoverable through the re-key; the product reference is not, because
    // the shop_products -> products link no longer exists.
    ctx.add_column_if_absent("order_items", "shop_id", "UUID REFERENCES shops (id)").await?;
    ctx.execute(
        r#"
UPDATE order_items oi
SET shop_id = sp.shop_id
FROM shop_products sp
WHERE sp.id = oi.shop_product_id
  AND oi.shop_id IS NULL
"#,
    )
    .await?;
    ctx.add_column_if_absent("order_items", "product_id", "UUID REFERENCES products (id)").await?;
    ctx.add_column_if_absent("shop_products", "product_id", "UUID REFERENCES products (id)")
        .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_product_id",
        "CREATE INDEX idx_shop_products_product_id ON shop_products (product_id)",
    )
    .await?;

    Ok(())
}

regrade::register_migration! {
    version: "2024_12_15_100000",
    name: "finalize-autonomy",
    phase: Phase::Destructive,
    apply: apply,
    revert: revert,
    revert_note: "legacy product references cannot be reconstructed: restored product_id columns come back NULL",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gates_cover_every_destructive_step() {
        // Each destructive statement above is guarded by one of these.
        for gate in [&ENRICHED_GATE, &PRICED_GATE, &REKEYED_GATE, &UNIQUE_SLUG_GATE] {
            assert!(gate.blocking_sql.to_lowercase().contains("count(*)"));
        }
    }
}
