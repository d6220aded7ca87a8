//! Strategy module
//!
//! Entry signals and the confluence check they must pass before sizing.

pub mod signal;
pub mod validator;

pub use signal::*;
pub use validator::*;
