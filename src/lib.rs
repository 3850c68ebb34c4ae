// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod backend;
pub mod config;
pub mod protocol;
pub mod routes;
pub mod session;
pub mod state;
pub mod types;
pub mod ws;
