//! Migration: vehicles-and-images
//!
//! Introduces the vehicle hierarchy (vehicles own their models, cascade
//! delete) with a direct vehicle <-> shop-product compatibility join, and
//! replaces the single `image` column with an ordered `shop_product_images`
//! table. The existing payloads are copied over as primary images; the old
//! column is dropped by the next (gated) migration.

use regrade::{MigrationContext, Phase, Result};

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS vehicles (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    brand TEXT NOT NULL,
    manufacturer_year INTEGER,
    description TEXT,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_vehicles_brand",
        "CREATE INDEX idx_vehicles_brand ON vehicles (brand)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_vehicles_manufacturer_year",
        "CREATE INDEX idx_vehicles_manufacturer_year ON vehicles (manufacturer_year)",
    )
    .await?;

    // Models are exclusively owned by their vehicle.
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS vehicle_models (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    vehicle_id UUID NOT NULL REFERENCES vehicles (id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_vehicle_models_name",
        "CREATE INDEX idx_vehicle_models_name ON vehicle_models (name)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_vehicle_models_vehicle_id",
        "CREATE INDEX idx_vehicle_models_vehicle_id ON vehicle_models (vehicle_id)",
    )
    .await?;

    // Direct vehicle-level compatibility; superseded later by the
    // model-level join.
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS vehicle_shop_product (
    vehicle_id UUID NOT NULL REFERENCES vehicles (id) ON DELETE CASCADE,
    shop_product_id UUID NOT NULL REFERENCES shop_products (id) ON DELETE CASCADE,
    PRIMARY KEY (vehicle_id, shop_product_id)
)
"#,
    )
    .await?;

    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS shop_product_images (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    shop_product_id UUID NOT NULL REFERENCES shop_products (id) ON DELETE CASCADE,
    image_data TEXT NOT NULL,
    alt_text TEXT,
    is_primary BOOLEAN NOT NULL DEFAULT false,
    display_order INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_product_images_shop_product_id",
        "CREATE INDEX idx_shop_product_images_shop_product_id ON shop_product_images (shop_product_id)",
    )
    .await?;
    // At most one primary image per product, DB-enforced.
    ctx.create_index_if_absent(
        "ux_shop_product_images_primary",
        "CREATE UNIQUE INDEX ux_shop_product_images_primary ON shop_product_images (shop_product_id) WHERE is_primary",
    )
    .await?;

    // Copy each existing payload over as the primary image. The NOT EXISTS
    // guard makes re-runs no-ops.
    ctx.execute(
        r#"
INSERT INTO shop_product_images (shop_product_id, image_data, is_primary, display_order)
SELECT sp.id, sp.image, true, 0
FROM shop_products sp
WHERE sp.image IS NOT NULL
  AND NOT EXISTS (
      SELECT 1 FROM shop_product_images i
      WHERE i.shop_product_id = sp.id AND i.is_primary
  )
"#,
    )
    .await?;

    Ok(())
}

async fn revert(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute("DROP TABLE IF EXISTS shop_product_images").await?;
    ctx.execute("DROP TABLE IF EXISTS vehicle_shop_product").await?;
    ctx.execute("DROP TABLE IF EXISTS vehicle_models").await?;
    ctx.execute("DROP TABLE IF EXISTS vehicles").await?;
    Ok(())
}

regrade::register_migration! {
    version: "2026_01_03_120000",
    name: "vehicles-and-images",
    phase: Phase::Additive,
    apply: apply,
    revert: revert,
    revert_note: "drops the vehicle hierarchy and all image galleries; only the primary image survives if the legacy image column was restored first",
}
