pub mod constants;
pub mod error;
pub mod event;
pub mod round;
pub mod types;

pub use constants::*;
pub use error::{DistributionError, ParseError, TokenError};
pub use event::LedgerEvent;
pub use round::{LedgerConfig, LedgerState, LifecycleState, RoundRecord};
pub use types::*;
