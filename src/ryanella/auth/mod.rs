//! Authentication core: password hashing, bearer tokens, and the access gate
//! guarding `/admin/*` routes.

pub mod gate;
pub mod password;
pub mod token;

pub use self::gate::{access_gate, Identity};
