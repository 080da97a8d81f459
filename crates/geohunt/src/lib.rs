pub mod engine;
pub mod geometry;
pub mod models;
