//! CLI command implementations.

pub mod cache;
pub mod doctor;
pub mod fetch;
pub mod load;
pub mod resolve;
