//! Quote templates and generated quotes.

pub mod generator;
pub mod handlers;
pub mod render;
pub mod store;
