pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod redis_client;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod websocket;
