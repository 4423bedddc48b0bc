//! Backend monitoring REST API
//!
//! This module provides:
//! - Request/response bodies (`messages`)
//! - The `MonitoringApi` implementation over HTTP (`rest`)

pub mod messages;
pub mod rest;

pub use rest::MonitoringRestClient;
