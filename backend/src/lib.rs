//! Ride-hailing backend library
//!
//! Ride lifecycle engine, fare calculation, notification dispatch and the
//! HTTP/WebSocket boundary shared by the server binary and integration tests.

pub mod auth;
pub mod captain;
pub mod config;
pub mod db;
pub mod error;
pub mod geocoding;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod ride;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;
