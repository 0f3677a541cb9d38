//! Local snapshot of Notion databases: a sync engine that writes the cache and
//! a read side that filters, orders and renders it.

pub mod cache;
pub mod config;
pub mod fetch;
pub mod format;
pub mod freshness;
pub mod normalize;
pub mod notion;
pub mod query;
pub mod retry;
pub mod sync;
