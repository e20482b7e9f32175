pub mod api;
pub mod config;
pub mod db;
pub mod ingest;
pub mod repo;
pub mod state;
pub mod ws;
