//! Terminal front end

pub mod interrupt;
pub mod progress;

pub use interrupt::{handle_interrupt, InterruptAction, InterruptPolicy};
pub use progress::{render_events, ProgressBoard, RunSummary};
