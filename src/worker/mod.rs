pub mod dispatch;
pub mod info;
pub mod page;
pub mod scanner;
pub mod scheduler;

pub use dispatch::{HttpDispatch, LocalDispatch, ScanDispatch};
pub use info::{ScanInfo, TaskSummary};
pub use page::PageFetcher;
pub use scanner::{BlockScanner, ScanReport};
pub use scheduler::{BlockOutcome, PassSummary, ScanScheduler};
