pub mod app;
pub mod common;
pub mod infra;
pub mod observability;
pub mod pipeline;
