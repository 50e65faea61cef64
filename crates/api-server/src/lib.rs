//! HTTP boundary for the adaptive policy engine — event ingestion,
//! recommendation serving, and operational endpoints.

pub mod rest;
pub mod server;

pub use server::ApiServer;
