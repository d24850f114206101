//! In-process adapters backed by `DashMap`. Used by the `memory` backends and
//! by tests; state does not survive a restart and is not shared across
//! instances.

mod auth_repo_memory;
mod idempotency_repo_memory;
mod payment_repo_memory;
mod refresh_session_repo_memory;

pub use auth_repo_memory::*;
pub use idempotency_repo_memory::*;
pub use payment_repo_memory::*;
pub use refresh_session_repo_memory::*;
