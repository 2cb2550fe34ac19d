pub mod policy;
pub mod tokens;

pub use tokens::{Sweeper, TokenStore};
