//! Queue items, their step results and run progress

mod item;
mod progress;

pub use item::{ImageData, LogLine, QueueItem, QueueItemId, QueueStatus, StepResult};
pub use progress::Progress;
