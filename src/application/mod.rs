//! Application services layer.

pub mod artifacts;
pub mod error;
pub mod jobs;
pub mod payload;
pub mod render;
pub mod repos;
pub mod sessions;
