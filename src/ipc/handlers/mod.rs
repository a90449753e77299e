pub mod core;
pub mod records;
pub mod reconcile;
pub mod setup;
