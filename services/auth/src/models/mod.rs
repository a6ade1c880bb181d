//! Authentication service models

pub mod role;
pub mod session;
pub mod user;

// Re-export for convenience
pub use role::{AccountStatus, Role};
pub use session::{NewSession, Session, SessionView};
pub use user::{NewUser, User, UserView};
