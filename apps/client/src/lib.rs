//! Merx client: configuration, app wiring and the listing views.

pub mod app;
pub mod config;
pub mod marketplace;
pub mod product;
