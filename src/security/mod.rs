// [rust] Security module organization - token, cookie, redirect and access primitives
pub mod access; // [security] Role and ownership decisions for protected operations
pub mod error; // [security] AuthError taxonomy shared by every layer
pub mod jwt; // [security] Session token issuing and validation (HS512)
pub mod login_state; // [security] Signed cookie carrying delegated-login state
pub mod password; // [security] Argon2id password hashing and verification
pub mod redirect; // [security] Post-login redirect allow-list

// [rust] Flat namespace: use crate::security::TokenCodec instead of crate::security::jwt::TokenCodec
pub use access::*;
pub use error::AuthError;
pub use jwt::*;
pub use login_state::*;
pub use redirect::*;
