mod auth_repo_mysql;
mod idempotency_repo_mysql;
mod payment_repo_mysql;
mod refresh_session_repo_mysql;

pub use auth_repo_mysql::*;
pub use idempotency_repo_mysql::*;
pub use payment_repo_mysql::*;
pub use refresh_session_repo_mysql::*;

mod util;
