pub mod checker;
pub mod error;
pub mod models;
pub mod registry;

pub use checker::{Checker, Rejection, RejectionKind};
pub use error::Error;
pub use registry::Registry;
pub type Result<T> = std::result::Result<T, Error>;
