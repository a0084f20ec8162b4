//! Session orchestration
//!
//! A session ties a persona, its conversation and the completion client
//! together and enforces one request in flight at a time.

mod session;
mod sessions;

pub use session::{SessionError, SessionSnapshot};
pub use sessions::SessionManager;
