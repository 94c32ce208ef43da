//! Infrastructure adapters: database, render service, object storage, HTTP.

pub mod db;
pub mod error;
pub mod http;
pub mod render;
pub mod storage;
pub mod telemetry;
