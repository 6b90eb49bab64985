pub mod harness;
pub mod reports;
pub mod tester;

pub use harness::Harness;
pub use tester::*;
