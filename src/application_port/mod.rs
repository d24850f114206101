mod auth_service;
mod idempotency;
mod payment_service;

pub use auth_service::*;
pub use idempotency::*;
pub use payment_service::*;
