pub mod config;
pub mod downloader;
pub mod server;
pub mod store;
