//! Schema layer for the partsgrid marketplace.
//!
//! partsgrid is a multi-tenant marketplace for automotive parts: independent
//! shops sell from their own catalogs on a shared platform. This crate owns
//! the relational schema and its evolution:
//!
//! - [`models`]: the target (post-migration) data model. Autonomous
//!   per-shop products, ordered product images, the vehicle / vehicle-model
//!   compatibility hierarchy, and order line items keyed by shop product.
//! - [`migrations`]: the ordered migration pipeline that takes a legacy
//!   shared-catalog database to that target shape, with backfills and gated
//!   destructive phases.
//! - [`catalog`]: the write path for shop products, which allocates
//!   per-shop slugs through [`regrade::slug`] instead of a database trigger.
//!
//! The `partsgrid-db` binary is the operator surface: `migrate`, `status`,
//! `verify`, `revert`, `seed`.

pub mod catalog;
pub mod migrations;
pub mod models;
