//! # Catalog DB
//!
//! Connection and schema bootstrap for the local SQLite catalog that stores
//! discovered locations, resources, reference tables, settings and JSON documents.

/// Connection pool creation and schema migration.
pub mod database;
