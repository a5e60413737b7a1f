pub mod cli;
pub mod commands;
pub mod compose;
pub mod config;
pub mod docker;
pub mod environment;
pub mod error;
pub mod health;
pub mod io;
pub mod orchestrator;
pub mod platform;
pub mod settings;
pub mod ui;
pub mod versions;
