pub mod app;
pub mod call;
pub mod config;
pub mod control;
pub mod event;
pub mod handler;
pub mod preflight;
pub mod version;
