pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod licensing;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod payments;
pub mod reconcile;
pub mod util;
