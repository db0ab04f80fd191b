//! Migration: baseline-schema
//!
//! The legacy shape the platform launched with: a shared `products` catalog,
//! `shop_products` as thin per-shop stock/price overlays referencing it, and
//! `order_items` keyed by the `(product_id, shop_id)` pair. Everything later
//! in the pipeline evolves away from this.

use regrade::{MigrationContext, Phase, Result};

async fn apply(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    email TEXT NOT NULL UNIQUE,
    full_name TEXT,
    hashed_password TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;

    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS shops (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    owner_id UUID NOT NULL REFERENCES users (id),
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    description TEXT,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;

    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS categories (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;

    // The shared catalog every shop sells from, pre-autonomy.
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    name TEXT NOT NULL,
    description TEXT,
    technical_details TEXT,
    oe_number TEXT,
    brand TEXT,
    manufacturer TEXT,
    model TEXT,
    manufacturer_year INTEGER,
    weight DOUBLE PRECISION,
    dimensions TEXT,
    image TEXT,
    price NUMERIC(12, 2) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_products_name",
        "CREATE INDEX idx_products_name ON products (name)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_products_oe_number",
        "CREATE INDEX idx_products_oe_number ON products (oe_number)",
    )
    .await?;

    // Per-shop overlay on the shared catalog: stock, price and SKU only.
    // Price is nullable here; NULL means "use the catalog price".
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS shop_products (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    shop_id UUID NOT NULL REFERENCES shops (id) ON DELETE CASCADE,
    product_id UUID NOT NULL REFERENCES products (id) ON DELETE CASCADE,
    stock_quantity INTEGER NOT NULL DEFAULT 0,
    price NUMERIC(12, 2),
    sale_price NUMERIC(12, 2),
    sku TEXT,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_shop_id",
        "CREATE INDEX idx_shop_products_shop_id ON shop_products (shop_id)",
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_shop_products_product_id",
        "CREATE INDEX idx_shop_products_product_id ON shop_products (product_id)",
    )
    .await?;

    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS orders (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    user_id UUID NOT NULL REFERENCES users (id),
    order_number TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    total_amount NUMERIC(12, 2) NOT NULL,
    shipping_address TEXT NOT NULL,
    billing_address TEXT NOT NULL,
    payment_method TEXT NOT NULL,
    payment_status TEXT NOT NULL DEFAULT 'pending',
    tracking_number TEXT,
    notes TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;

    // Line items reference the (product, shop) pair; the re-key migration
    // later collapses this to a single shop_product_id.
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS order_items (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    product_id UUID NOT NULL REFERENCES products (id),
    shop_id UUID NOT NULL REFERENCES shops (id),
    quantity INTEGER NOT NULL,
    unit_price NUMERIC(12, 2) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;
    ctx.create_index_if_absent(
        "idx_order_items_order_id",
        "CREATE INDEX idx_order_items_order_id ON order_items (order_id)",
    )
    .await?;

    // Append-only status ledger; order rows themselves stay immutable
    // apart from payment/tracking fields.
    ctx.execute(
        r#"
CREATE TABLE IF NOT EXISTS order_status_updates (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    status TEXT NOT NULL,
    comment TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#,
    )
    .await?;

    Ok(())
}

async fn revert(ctx: &MigrationContext<'_>) -> Result<()> {
    // Reverse FK order.
    ctx.execute("DROP TABLE IF EXISTS order_status_updates").await?;
    ctx.execute("DROP TABLE IF EXISTS order_items").await?;
    ctx.execute("DROP TABLE IF EXISTS orders").await?;
    ctx.execute("DROP TABLE IF EXISTS shop_products").await?;
    ctx.execute("DROP TABLE IF EXISTS products").await?;
    ctx.execute("DROP TABLE IF EXISTS categories").await?;
    ctx.execute("DROP TABLE IF EXISTS shops").await?;
    ctx.execute("DROP TABLE IF EXISTS users").await?;
    Ok(())
}

regrade::register_migration! {
    version: "2024_10_01_000000",
    name: "baseline-schema",
    phase: Phase::Additive,
    apply: apply,
    revert: revert,
    revert_note: "drops the entire legacy schema including all user, shop, catalog and order data",
}
