mod queue;

pub use crate::queue::{Completion, run_bounded};
