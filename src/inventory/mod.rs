pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod valuation;

pub use error::*;
pub use models::*;
pub use repository::*;
pub use service::*;
