pub mod config;
pub mod data;
pub mod log;
pub mod pipeline;
pub mod render;
pub mod viewer;
