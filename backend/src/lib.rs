pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod prediction;
pub mod routes;
pub mod state;
pub mod storage;
