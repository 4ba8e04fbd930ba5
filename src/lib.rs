pub mod app;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod download;
pub mod error;
pub mod extract;
pub mod imaging;
pub mod output;
pub mod reconcile;
pub mod site;
pub mod store;
