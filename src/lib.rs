//! Vessel-scoped data synchronisation for a fleet management backend

pub mod api;
pub mod cache;
pub mod cashflow;
pub mod config;
pub mod context;
pub mod errors;
pub mod models;
pub mod query;
pub mod voyage;
