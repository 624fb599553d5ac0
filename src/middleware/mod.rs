pub mod auth;

pub use auth::{auth_middleware, request_context, CurrentUser};
