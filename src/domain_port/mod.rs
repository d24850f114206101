mod store_error;

pub use store_error::*;

// repo

mod auth_repo;
mod idempotency_repo;
mod payment_repo;
mod refresh_session_repo;

pub use auth_repo::*;
pub use idempotency_repo::*;
pub use payment_repo::*;
pub use refresh_session_repo::*;
