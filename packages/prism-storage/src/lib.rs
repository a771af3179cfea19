pub mod db;
pub mod models;
pub mod queries;
pub mod schema;
pub mod vector;

mod error;

pub use error::{Error, Result};
