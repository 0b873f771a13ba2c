pub mod config;
pub mod routes;
pub mod service;
pub mod state;
