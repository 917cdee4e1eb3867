//! Core renderer configuration

pub mod config;

pub use config::RendererConfig;
