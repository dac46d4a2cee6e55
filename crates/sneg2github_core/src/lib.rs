//! Forum-to-tracker migration: scrape a phpBB bug subforum into SQLite, then
//! publish the stored topics as GitHub issues.

pub mod config;
pub mod export;
pub mod forum;
pub mod http;
pub mod import;
pub mod runtime;
pub mod storage;
pub mod thread;
pub mod tracker;
