pub mod audit;
pub mod error;
pub mod handlers;
pub mod models;
pub mod numbering;
pub mod price_calculator;
pub mod repository;
pub mod service;
pub mod status_machine;

pub use audit::{AuditLogger, PgAuditSink};
pub use error::*;
pub use models::*;
pub use price_calculator::*;
pub use repository::*;
pub use service::*;
pub use status_machine::*;
