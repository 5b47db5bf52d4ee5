pub mod app;
pub mod config;
pub mod error;
pub mod model;
pub mod predictor;
pub mod render;
pub mod schema;
pub mod types;
