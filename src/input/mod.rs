//! # Input timing
//!
//! ```text
//! input/
//! ├── press_classifier.rs - short/long press classification
//! └── dispatch_queue.rs   - paced press/release worker
//! ```

pub mod dispatch_queue;
pub mod press_classifier;

pub use dispatch_queue::{DispatchQueue, QueueEntry};
pub use press_classifier::{PressSignal, PressTimingClassifier};
