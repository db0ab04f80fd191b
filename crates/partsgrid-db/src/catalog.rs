//! Catalog write path for shop products.
//!
//! Slug allocation happens here, in the same transaction as the write, not
//! in a database trigger. Two concurrent writers in one shop can still race
//! between the allocator's probe and the insert; the unique backstop index
//! on `(shop_id, slug)` turns that race into a unique violation, and the
//! write is retried with a fresh allocation (optimistic retry).

use regrade::{Result, SlugScope, is_unique_violation, slug};
use rust_decimal::Decimal;
use tokio_postgres::Client;
use tracing::debug;
use uuid::Uuid;

use crate::models::ShopProduct;

/// The tenant partition shop-product slugs are unique within.
pub const SHOP_PRODUCT_SLUGS: SlugScope<'static> = SlugScope {
    table: "shop_products",
    scope_column: "shop_id",
    slug_column: "slug",
    id_column: "id",
};

/// Attempts per write before a persistent unique violation is surfaced.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Input for creating a shop product.
#[derive(Debug, Clone)]
pub struct NewShopProduct {
    pub shop_id: Uuid,
    pub name: String,
    /// Optional caller-supplied slug; derived from `name` when absent.
    pub slug: Option<String>,
    pub description: Option<String>,
    pub technical_details: Option<String>,
    pub oe_number: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub manufacturer_year: Option<i32>,
    pub weight: Option<f64>,
    pub dimensions: Option<String>,
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub sku: Option<String>,
    pub stock_quantity: i32,
}

impl NewShopProduct {
    pub fn new(shop_id: Uuid, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            shop_id,
            name: name.into(),
            slug: None,
            description: None,
            technical_details: None,
            oe_number: None,
            brand: None,
            manufacturer: None,
            model: None,
            manufacturer_year: None,
            weight: None,
            dimensions: None,
            price,
            sale_price: None,
            sku: None,
            stock_quantity: 0,
        }
    }
}

const INSERT_SHOP_PRODUCT: &str = r#"
INSERT INTO shop_products (
    shop_id, name, slug, description, technical_details, oe_number,
    brand, manufacturer, model, manufacturer_year, weight, dimensions,
    price, sale_price, sku, stock_quantity
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
RETURNING *
"#;

/// Create a shop product, allocating a slug unique within the shop.
pub async fn create_shop_product(client: &mut Client, input: &NewShopProduct) -> Result<ShopProduct> {
    let mut attempt = 1u32;
    loop {
        let tx = client.transaction().await?;
        let slug = slug::allocate(
            &tx,
            &SHOP_PRODUCT_SLUGS,
            &input.shop_id,
            &input.name,
            input.slug.as_deref(),
            None,
        )
        .await?;

        let inserted = tx
            .query_one(
                INSERT_SHOP_PRODUCT,
                &[
                    &input.shop_id,
                    &input.name,
                    &slug,
                    &input.description,
                    &input.technical_details,
                    &input.oe_number,
                    &input.brand,
                    &input.manufacturer,
                    &input.model,
                    &input.manufacturer_year,
                    &input.weight,
                    &input.dimensions,
                    &input.price,
                    &input.sale_price,
                    &input.sku,
                    &input.stock_quantity,
                ],
            )
            .await
            .map_err(regrade::Error::from);

        match inserted {
            Ok(row) => {
                tx.commit().await?;
                return Ok(ShopProduct::from_row(&row));
            }
            Err(e) if is_unique_violation(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                // Lost the race against a concurrent writer in the same
                // shop; the transaction rolls back on drop.
                debug!(shop_id = %input.shop_id, attempt, "slug collision, retrying");
                drop(tx);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Rename a shop product, re-allocating its slug within the shop.
///
/// The row's own id is excluded from the collision probe so an unchanged
/// name keeps its slug.
pub async fn rename_shop_product(
    client: &mut Client,
    id: Uuid,
    name: &str,
    candidate_slug: Option<&str>,
) -> Result<ShopProduct> {
    let mut attempt = 1u32;
    loop {
        let tx = client.transaction().await?;
        let row = tx
            .query_one(
                "SELECT shop_id FROM shop_products WHERE id = $1 FOR UPDATE",
                &[&id],
            )
            .await?;
        let shop_id: Uuid = row.get(0);

        let slug = slug::allocate(
            &tx,
            &SHOP_PRODUCT_SLUGS,
            &shop_id,
            name,
            candidate_slug,
            Some(id),
        )
        .await?;

        let updated = tx
            .query_one(
                r#"
                UPDATE shop_products
                SET name = $2, slug = $3, updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
                &[&id, &name, &slug],
            )
            .await
            .map_err(regrade::Error::from);

        match updated {
            Ok(row) => {
                tx.commit().await?;
                return Ok(ShopProduct::from_row(&row));
            }
            Err(e) if is_unique_violation(&e) && attempt < MAX_WRITE_ATTEMPTS => {
                debug!(%id, attempt, "slug collision, retrying");
                drop(tx);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
