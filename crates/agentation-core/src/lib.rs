pub mod error;
pub mod event_log;
pub mod model;

pub use error::{CoreError, CoreResult};
pub use event_log::EventLog;
pub use model::*;
