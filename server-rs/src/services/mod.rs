pub mod clock;
pub mod ledger;
pub mod members;
pub mod roster;
pub mod status;

pub use clock::{Clock, FixedClock, SystemClock};
pub use members::MemberService;
