pub mod chatrace;
pub mod envelope;
