//! Use cases that span several aggregates or outside collaborators.
pub mod accounts;
pub mod calendar;
pub mod dashboard;
pub mod orders;
pub mod refunds;
pub mod settings;
pub mod summary;
