//! Client for the tenant-scoped data source documents API.

pub mod client;
pub mod models;

pub use client::{DataSourceClient, DataSourceClientConfig, DataSourceClientError};
pub use models::{DataSourceConfig, DataSourceDocument};
