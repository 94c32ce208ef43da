//! Asynchronous quote PDF generation: job store, payload building, rendering,
//! artifact publishing and the HTTP surface that drives them.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
