pub mod adb;
pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod state;
