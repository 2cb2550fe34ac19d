pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hashtags;
pub mod models;
pub mod pagination;
pub mod service;
pub mod store;

pub use error::{Error, ErrorKind, Result};
