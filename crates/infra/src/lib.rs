//! Infrastructure layer: storage, configuration, session and notifier
//! adapters, and the application services built on top of them.

pub mod config;
pub mod notifier;
pub mod services;
pub mod session;
pub mod store;

#[cfg(test)]
mod integration_tests;
