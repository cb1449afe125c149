pub mod output;
pub mod progress;

pub use output::{OutputFormatter, OutputMode, PackSummary};
pub use progress::{finish_progress_with_summary, ProgressManager};
