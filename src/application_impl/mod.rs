mod auth_service_impl;
mod credential_hasher_argon2;
mod fingerprint;
mod idempotency_engine;
mod payment_service_impl;
mod token_codec_jwt;

pub use auth_service_impl::*;
pub use credential_hasher_argon2::*;
pub use fingerprint::*;
pub use idempotency_engine::*;
pub use payment_service_impl::*;
pub use token_codec_jwt::*;
