pub mod account;
pub mod member;

pub use account::*;
pub use member::*;
