#![forbid(unsafe_code)]

mod alert;
mod criteria;
mod engine;
mod error;
mod store;
mod subscription;

pub use alert::*;
pub use criteria::*;
pub use engine::*;
pub use error::*;
pub use store::*;
pub use subscription::*;
