pub mod app;
pub mod config;
pub mod error;
pub mod recipes;
pub mod state;
pub mod store;
