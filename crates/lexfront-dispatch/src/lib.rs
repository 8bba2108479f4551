//! # Lexfront Dispatch
//!
//! Concrete implementations of the lifecycle engine's collaborator traits:
//! SMTP campaign dispatch (lettre), the search-index ping (reqwest), and
//! the DB-backed subscriber registry. The engine itself never knows which
//! of these it is talking to.

pub mod email;
pub mod registry;
pub mod search;

pub use email::{SmtpDispatcher, StubDispatcher};
pub use registry::DbSubscriberRegistry;
pub use search::SearchPing;
