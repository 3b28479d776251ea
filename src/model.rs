pub mod error;
pub mod oss;
pub mod outcome;
