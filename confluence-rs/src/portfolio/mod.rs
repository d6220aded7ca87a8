//! Portfolio management module

pub mod balance;
pub mod ledger;
pub mod position;
pub mod risk;

pub use balance::*;
pub use ledger::*;
pub use position::*;
pub use risk::*;
