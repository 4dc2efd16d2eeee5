//! Offline-first flashcard review core: a spaced-repetition scheduler over
//! locally stored per-card stats, a message-bus data access layer with local
//! and remote adapters, and the HTTP sync server the remote adapter talks to.

pub mod adapters;
pub mod config;
pub mod core;
pub mod db;
pub mod logging;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
