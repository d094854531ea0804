pub mod config;
pub mod console;
pub mod error;
pub mod eval;
pub mod gateway;
pub mod persistence;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod worker;
