mod refresh_session_repo_redis;

pub use refresh_session_repo_redis::*;
