pub mod config;
pub mod constants;
pub mod domain;
pub mod executor;
pub mod http;
pub mod pool;
pub mod runner;
