pub mod bom;
pub mod combo;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod stock_check;
pub mod units;

pub use bom::*;
pub use combo::*;
pub use engine::*;
pub use error::*;
pub use stock_check::*;
pub use units::Unit;
