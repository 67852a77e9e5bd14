//! The authentication core: credential hashing, validation, session
//! lifecycle, and single-use email tokens. Everything here is independent of
//! the HTTP boundary and runs against the repository traits in [`crate::store`].

pub mod password;
pub mod session;
pub mod tokens;
pub mod validator;
