//! Pipeline execution engines

pub mod hooks;
pub mod parallel;
pub mod waterfall;

pub use hooks::Hooks;
pub use parallel::Parallel;
pub use waterfall::{RegisterInfo, Waterfall};
