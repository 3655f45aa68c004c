//! In-memory repositories. Each one keeps a dense record vector plus hash indices into
//! it under a single read/write lock, deleting by swap-remove.

pub mod heap;
pub mod sessions;
pub mod users;

pub use sessions::{Session, SessionError, SessionStore};
pub use users::{NewUser, User, UserError, UserPage, UserPatch, UserRepository};
