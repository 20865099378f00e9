pub mod builder;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod loader;
pub mod model;
pub mod queries;
pub mod table;
pub mod util;
