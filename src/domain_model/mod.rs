mod idempotency;
mod payment;
mod session;
mod user;

pub use idempotency::*;
pub use payment::*;
pub use session::*;
pub use user::*;
