mod caveat;
mod common;
mod identifier;
mod macaroon;

pub use caveat::*;
pub use common::*;
pub use identifier::*;
pub use macaroon::*;
