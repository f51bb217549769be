//! catalog-cache library
//!
//! A read-through cache for a remote catalog API. Entities are cached in
//! memory with a time-to-live and the cache is persisted as a whole snapshot
//! so it survives process restarts.

pub mod cache;
pub mod catalog;
pub mod cli;
