pub mod catalog;
pub mod clock;
pub mod config;
pub mod env;
pub mod errors;
pub mod models;
pub mod tasks;
