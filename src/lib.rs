//! Brochure Sync
//!
//! Keeps a product catalog in step with a spreadsheet and renders it as an
//! HTML/PDF brochure and a live dashboard.

pub mod brochure;
pub mod config;
pub mod core;
pub mod import;
pub mod polling;
pub mod server;
pub mod sheets;
