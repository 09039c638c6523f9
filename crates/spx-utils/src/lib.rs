mod arrayvec;
mod assert;
mod thread;

pub use arrayvec::{ArrayStr, ArrayVec};
pub use thread::{ThreadPriority, thread_boot};
