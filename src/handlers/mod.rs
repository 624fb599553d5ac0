pub mod auth;
pub mod email_verification;
pub mod oauth;
pub mod password;
pub mod sessions;
pub mod two_factor;
