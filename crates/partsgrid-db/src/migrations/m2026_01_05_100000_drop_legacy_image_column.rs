//! Migration: drop-legacy-image-column
//!
//! Destructive half of the image split: removes `shop_products.image` once
//! every payload verifiably exists as a primary row in
//! `shop_product_images`. The revert restores the column and copies the
//! primary payloads back, which is lossless for the primary image.

use regrade::{Gate, MigrationContext, Phase, Result, finalize, guard};

/// Holds once every legacy payload has a primary-image row.
const IMAGES_COPIED_GATE: Gate<'static> = Gate {
    description: "legacy image payloads not yet copied to shop_product_images",
    blocking_sql: r#"
        SELECT count(*)
        FROM shop_products sp
        WHERE sp.image IS NOT NULL
          AND NOT EXISTS (
              SELECT 1 FROM shop_product_images i
              WHERE i.shop_product_id = sp.id AND i.is_primary
          )
    "#,
};

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    let tx = ctx.transaction();
    // Already dropped on a re-run; the gate query would fail without the
    // column, so check first.
    if !guard::column_exists(tx, "shop_products", "image").await? {
        return Ok(());
    }
    finalize::drop_column(tx, "shop_products", "image", &IMAGES_COPIED_GATE).await
}

async fn revert(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.add_column_if_absent("shop_products", "image", "TEXT").await?;
    ctx.execute(
        r#"
UPDATE shop_products sp
SET image = i.image_data
FROM shop_product_images i
WHERE i.shop_product_id = sp.id
  AND i.is_primary
  AND sp.image IS NULL
"#,
    )
    .await?;
    Ok(())
}

regrade::register_migration! {
    version: "2026_01_05_100000",
    name: "drop-legacy-image-column",
    phase: Phase::Destructive,
    apply: apply,
    revert: revert,
}
