pub mod api;
pub mod cli;
pub mod engine;
pub mod export;
pub mod services;
pub mod storage;
pub mod workflows;
