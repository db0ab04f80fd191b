//! Migration: vehicle-model-compat
//!
//! Moves product compatibility from vehicle level to vehicle-model level.
//! Every existing vehicle link fans out to all models of that vehicle, then
//! the direct join is dropped. The drop is gated on "no link references a
//! vehicle without models", because such links have nothing to fan out to
//! and would be silently lost.
//!
//! The revert re-derives the direct join through `vehicle_models.vehicle_id`.
//! That round-trips exactly unless a product was mapped to a proper subset
//! of a vehicle's models, in which case the finer granularity collapses.

use regrade::{Gate, MigrationContext, Phase, Result, finalize, guard};

/// Holds once every vehicle link has at least one model to fan out to.
const FANOUT_GATE: Gate<'static> = Gate {
    description: "vehicle links referencing vehicles without models",
    blocking_sql: r#"
        SELECT count(*)
        FROM vehicle_shop_product vsp
        WHERE NOT EXISTS (
            SELECT 1 FROM vehicle_models vm WHERE vm.vehicle_id = vsp.vehicle_id
        )
    "#,
};

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    let tx = ctx.transaction();

    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS vehicle_model_shop_product (
    vehicle_model_id UUID NOT NULL REFERENCES vehicle_models (id) ON DELETE CASCADE,
    shop_product_id UUID NOT NULL REFERENCES shop_products (id) ON DELETE CASCADE,
    PRIMARY KEY (vehicle_model_id, shop_product_id)
)
"#,
    )
    .await?;

    // Already migrated on a re-run.
    if !guard::table_exists(tx, "vehicle_shop_product").await? {
        return Ok(());
    }

    ctx.execute(
        r#"
INSERT INTO vehicle_model_shop_product (vehicle_model_id, shop_product_id)
SELECT DISTINCT vm.id, vsp.shop_product_id
FROM vehicle_shop_product vsp
JOIN vehicle_models vm ON vm.vehicle_id = vsp.vehicle_id
ON CONFLICT DO NOTHING
"#,
    )
    .await?;

    finalize::drop_table(tx, "vehicle_shop_product", &FANOUT_GATE).await?;

    Ok(())
}

async fn revert(ctx: &MigrationContext<'_>) -> Result<()> {
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
INSERT INTO vehicle_shop_product (vehicle_id, shop_product_id)
SELECT DISTINCT vm.vehicle_id, vmsp.shop_product_id
FROM vehicle_model_shop_product vmsp
JOIN vehicle_models vm ON vm.id = vmsp.vehicle_model_id
ON CONFLICT DO NOTHING
"#,
    )
    .await?;
    ctx.execute("DROP TABLE IF EXISTS vehicle_model_shop_product").await?;
    Ok(())
}

regrade::register_migration! {
    version: "2026_01_09_140000",
    name: "vehicle-model-compat",
    phase: Phase::Destructive,
    apply: apply,
    revert: revert,
    revert_note: "model-level compatibility collapses to whole-vehicle links; a product mapped to some models of a vehicle maps to all of them after revert",
}
