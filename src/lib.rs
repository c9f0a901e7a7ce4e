#![forbid(unsafe_code)]

pub mod archive;
pub mod browser;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod parse;
pub mod report;
pub mod resolve;
pub mod scrape;
pub mod storage;

pub use error::{Error, Result};
