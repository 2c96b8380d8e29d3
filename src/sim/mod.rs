pub mod lifecycle;
pub mod measurement;
pub mod message;
pub mod section;
