pub mod components;
pub mod config;
pub mod error;
mod shutdown;
pub mod startup;
pub mod utils;
