//! License engine: fingerprint matching, daily quota, validation and issuance.
//!
//! Everything here operates on an already-decrypted [`LicenseDatabase`](crate::models::LicenseDatabase)
//! and is free of I/O; persistence lives in [`crate::db::license_store`].

mod fingerprint;
mod issuer;
mod quota;
mod validator;

pub use fingerprint::*;
pub use issuer::*;
pub use quota::*;
pub use validator::*;
