pub mod cache;
pub mod daily;
pub mod generation;
pub mod session;
pub mod streak;
