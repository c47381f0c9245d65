pub mod calendar;
pub mod config;
pub mod engine;
pub mod http;
pub mod journal;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod wal;
