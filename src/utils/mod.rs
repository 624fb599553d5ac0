pub mod clock;
pub mod password;
pub mod secrets;
pub mod token;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use password::{hash_password, unusable_password_hash, verify_password, Password, PasswordHashString};
pub use secrets::SecretCipher;
pub use token::{generate_token, hash_token, hashes_match};
pub use validation::ValidatedJson;
