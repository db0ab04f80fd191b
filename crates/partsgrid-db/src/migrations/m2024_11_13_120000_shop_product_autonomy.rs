//! Migration: shop-product-autonomy
//!
//! Phase 1 of making shop products autonomous: every descriptive attribute
//! of the shared catalog gains a counterpart column on `shop_products`,
//! defaulted so existing rows stay valid, plus the category junction and the
//! supporting index set. Nothing is dropped or promoted here; enrichment and
//! finalization are separate steps.

use regrade::{MigrationContext, Phase, Result};

use super::{PLACEHOLDER_NAME, PLACEHOLDER_SLUG};

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    // Category links are owned by the shop product and the category alike;
    // deleting either parent deletes the link.
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS shop_product_category (
    shop_product_id UUID NOT NULL REFERENCES shop_products (id) ON DELETE CASCADE,
    category_id UUID NOT NULL REFERENCES categories (id) ON DELETE CASCADE,
    PRIMARY KEY (shop_product_id, category_id)
)
"#,
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_product_category_shop_product_id",
        "CREATE INDEX idx_shop_product_category_shop_product_id ON shop_product_category (shop_product_id)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_product_category_category_id",
        "CREATE INDEX idx_shop_product_category_category_id ON shop_product_category (category_id)",
    )
    .await?;

    // Placeholder defaults mark rows as "not yet enriched" for the backfill.
    let name_def = format!("TEXT NOT NULL DEFAULT '{PLACEHOLDER_NAME}'");
    let slug_def = format!("TEXT NOT NULL DEFAULT '{PLACEHOLDER_SLUG}'");
    ctx.add_column_if_absent("shop_products", "name", &name_def).await?;
    ctx.add_column_if_absent("shop_products", "slug", &slug_def).await?;
    ctx.add_column_if_absent("shop_products", "description", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "technical_details", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "oe_number", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "brand", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "manufacturer", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "model", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "manufacturer_year", "INTEGER").await?;
    ctx.add_column_if_absent("shop_products", "weight", "DOUBLE PRECISION").await?;
    ctx.add_column_if_absent("shop_products", "dimensions", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "image", "TEXT").await?;
    ctx.add_column_if_absent("shop_products", "is_featured", "BOOLEAN NOT NULL DEFAULT false")
        .await?;
    ctx.add_column_if_absent("shop_products", "is_on_sale", "BOOLEAN NOT NULL DEFAULT false")
        .await?;

    ctx.create_index_if_absent(
        "idx_shop_products_name",
        "CREATE INDEX idx_shop_products_name ON shop_products (name)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_slug",
        "CREATE INDEX idx_shop_products_slug ON shop_products (slug)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_oe_number",
        "CREATE INDEX idx_shop_products_oe_number ON shop_products (oe_number)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_brand",
        "CREATE INDEX idx_shop_products_brand ON shop_products (brand)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_model",
        "CREATE INDEX idx_shop_products_model ON shop_products (model)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_is_featured",
        "CREATE INDEX idx_shop_products_is_featured ON shop_products (is_featured)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_shop_active",
        "CREATE INDEX idx_shop_products_shop_active ON shop_products (shop_id, is_active)",
    )
    .await?;
    // Non-unique for now: placeholder slugs collide within a shop until the
    // enrichment backfill rebuilds them. The unique backstop lands in the
    // finalization migration.
    ctx.create_index_if_absent(
        "idx_shop_products_shop_slug",
        "CREATE INDEX idx_shop_products_shop_slug ON shop_products (shop_id, slug)",
    )
    .await?;

    Ok(())
}

async fn revert(ctx: &MigrationContext<'_>) -> Result<()> {
    for index in [
        "idx_shop_products_shop_slug",
        "idx_shop_products_shop_active",
        "idx_shop_products_is_featured",
        "idx_shop_products_model",
        "idx_shop_products_brand",
        "idx_shop_products_oe_number",
        "idx_shop_products_slug",
        "idx_shop_products_name",
    ] {
        ctx.execute(&format!("DROP INDEX IF EXISTS {index}")).await?;
    }
    for column in [
        "is_on_sale",
        "is_featured",
        "image",
        "dimensions",
        "weight",
        "manufacturer_year",
        "model",
        "manufacturer",
        "brand",
        "oe_number",
        "technical_details",
        "description",
        "slug",
        "name",
    ] {
        ctx.execute(&format!(
            "ALTER TABLE shop_products DROP COLUMN IF EXISTS {column}"
        ))
        .await?;
    }
    ctx.execute("DROP TABLE IF EXISTS shop_product_category").await?;
    Ok(())
}

regrade::register_migration! {
    version: "2024_11_13_120000",
    name: "shop-product-autonomy",
    phase: Phase::Additive,
    apply: apply,
    revert: revert,
    revert_note: "drops the per-shop descriptive columns; shop-specific names, descriptions and category links are discarded",
}
