pub mod catalog;
pub mod message;
pub mod quote;
