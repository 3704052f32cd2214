pub mod baton_config;
pub mod config;
pub mod delegation;
pub mod errors;
pub mod gates;
pub mod handlers;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod phase;
pub mod store;
pub mod ui;

#[cfg(test)]
mod test_support;
