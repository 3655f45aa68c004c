//! Long-running background tasks spawned next to the HTTP server.

pub mod session_reaper;

pub use session_reaper::{ReaperHandle, ReaperStats};
