pub mod handlers;
pub mod menu;
pub mod models;
pub mod repository;

pub use menu::*;
pub use models::*;
pub use repository::*;
