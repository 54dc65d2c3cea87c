// Library exports for mailcsv crate
// This allows tests and the binary to use the modules

pub mod attachment_parser;
pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod imap_client;
pub mod mailbox;
pub mod row_extractor;
pub mod scanner;
pub mod sink;
pub mod subject;
