//! Analysis results and caching

pub mod cache;
pub mod result;
