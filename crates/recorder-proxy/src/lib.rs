//! recorder-proxy: a small REST front for a lecture-capture platform.
//!
//! Inbound calls pass a shared Basic credential check, then each one becomes a
//! single authenticated SOAP or REST call against the vendor, made with a
//! session that is logged in once and reused for the life of the process.

pub mod adapter;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod harness;
pub mod metrics;
pub mod model;
pub mod server;
pub mod session;
pub mod soap;
pub mod timing;
pub mod vendor;

pub use adapter::RecorderAdapter;
pub use config::ServerConfig;
pub use server::ProxyServer;
pub use vendor::{HttpVendorClient, VendorApi};
