//! Shared building blocks: errors, domain types, traits and handler registries

pub mod channels;
pub mod errors;
pub mod registry;
pub mod traits;
pub mod types;
