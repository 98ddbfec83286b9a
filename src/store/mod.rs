//! Persistence for the order lifecycle aggregates.
pub mod orders;

pub use orders::OrderView;
