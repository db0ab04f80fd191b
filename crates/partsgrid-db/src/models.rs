//! Target data model: the shape the migration pipeline converges on.
//!
//! Each struct mirrors one post-migration table. Mapping from
//! `tokio_postgres` rows is manual (`from_row`); columns are listed in the
//! order the final schema declares them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::Row;
use uuid::Uuid;

/// A tenant-scoped product listing.
///
/// After the autonomy migration, every descriptive attribute lives directly
/// on this row; nothing is inherited from a shared catalog entry. The
/// `(shop_id, slug)` pair is unique, enforced by a backstop index and
/// maintained by [`crate::catalog`].
#[derive(Debug, Clone)]
pub struct ShopProduct {
    pub id: Uuid,
    /// Owning shop. Cross-entity reference, deletes cascade from the shop.
    pub shop_id: Uuid,
    pub name: String,
    /// Unique within the owning shop.
    pub slug: String,
    pub description: Option<String>,
    pub technical_details: Option<String>,
    /// Original-equipment part number.
    pub oe_number: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub manufacturer_year: Option<i32>,
    /// Weight in kilograms.
    pub weight: Option<f64>,
    pub dimensions: Option<String>,
    /// Mandatory and non-negative once finalization has run.
    pub price: Decimal,
    pub sale_price: Option<Decimal>,
    pub sku: Option<String>,
    pub stock_quantity: i32,
    pub is_active: bool,
    pub is_featured: bool,
    pub is_on_sale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShopProduct {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            shop_id: row.get("shop_id"),
            name: row.get("name"),
            slug: row.get("slug"),
            description: row.get("description"),
            technical_details: row.get("technical_details"),
            oe_number: row.get("oe_number"),
            brand: row.get("brand"),
            manufacturer: row.get("manufacturer"),
            model: row.get("model"),
            manufacturer_year: row.get("manufacturer_year"),
            weight: row.get("weight"),
            dimensions: row.get("dimensions"),
            price: row.get("price"),
            sale_price: row.get("sale_price"),
            sku: row.get("sku"),
            stock_quantity: row.get("stock_quantity"),
            is_active: row.get("is_active"),
            is_featured: row.get("is_featured"),
            is_on_sale: row.get("is_on_sale"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// An image owned by a shop product, ordered by `display_order`.
///
/// At most one image per product carries `is_primary` (partial unique
/// index).
#[derive(Debug, Clone)]
pub struct ShopProductImage {
    pub id: Uuid,
    pub shop_product_id: Uuid,
    /// Encoded image payload (data URI / base64, storage backends are out of
    /// scope here).
    pub image_data: String,
    pub alt_text: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

impl ShopProductImage {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            shop_product_id: row.get("shop_product_id"),
            image_data: row.get("image_data"),
            alt_text: row.get("alt_text"),
            is_primary: row.get("is_primary"),
            display_order: row.get("display_order"),
            created_at: row.get("created_at"),
        }
    }
}

/// A vehicle brand entry, e.g. "Toyota Hilux" generation data.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: Uuid,
    pub brand: String,
    pub manufacturer_year: Option<i32>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            brand: row.get("brand"),
            manufacturer_year: row.get("manufacturer_year"),
            description: row.get("description"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// A named model exclusively owned by a [`Vehicle`] (cascade delete).
///
/// Product compatibility is declared at this level through the
/// `vehicle_model_shop_product` join.
#[derive(Debug, Clone)]
pub struct VehicleModel {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleModel {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            vehicle_id: row.get("vehicle_id"),
            name: row.get("name"),
            description: row.get("description"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// A line item of an order, keyed by a single shop product.
///
/// `product_name` and `shop_name` are snapshots taken at purchase time and
/// are never refreshed from the live catalog: later edits to the shop
/// product must not rewrite order history. Created once at checkout and not
/// mutated afterwards; status tracking lives in the separate append-only
/// `order_status_updates` ledger.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub shop_product_id: Uuid,
    pub product_name: Option<String>,
    pub shop_name: Option<String>,
    pub quantity: i32,
    /// Unit price at the time of purchase.
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            order_id: row.get("order_id"),
            shop_product_id: row.get("shop_product_id"),
            product_name: row.get("product_name"),
            shop_name: row.get("shop_name"),
            quantity: row.get("quantity"),
            unit_price: row.get("unit_price"),
            created_at: row.get("created_at"),
        }
    }
}
