pub mod cache;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod population;
