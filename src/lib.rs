pub mod config;
pub mod dto;
pub mod errors;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
