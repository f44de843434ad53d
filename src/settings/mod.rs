pub mod handlers;
pub mod service;
pub mod store;

pub use service::*;
pub use store::*;
