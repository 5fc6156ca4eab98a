//! Domain model (errors, capability keys, cancellation, ids).
//!
//! 他のモジュールから依存される葉のモジュールです。ディスパッチのロジックは持ちません。

pub mod cancel;
pub mod capability;
pub mod errors;
pub mod ids;

pub use self::cancel::CancellationToken;
pub use self::capability::{Capability, CapabilityKind};
pub use self::errors::{BoxError, MediatorError, NotificationFailure, ValidationFailure};
pub use self::ids::{DispatchId, PublishId, StreamId};
