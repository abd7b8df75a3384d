pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod sink;
pub mod table;
