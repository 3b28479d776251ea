pub mod headers;
pub mod object;
pub mod poll;
