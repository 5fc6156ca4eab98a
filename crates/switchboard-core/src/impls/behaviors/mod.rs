//! 組み込みの pipeline behaviors

pub mod logging;
pub mod validation;

pub use self::logging::LoggingBehavior;
pub use self::validation::{ValidationBehavior, Validator};
