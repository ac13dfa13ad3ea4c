//! Multi-language translator: a panel-based translation session with
//! history, backed by swappable translation and speech providers and
//! served over HTTP.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod history;
pub mod languages;
pub mod metrics;
pub mod retry;
pub mod session;
pub mod speech;
pub mod storage;
pub mod translation;
pub mod users;
