pub mod approval;
pub mod timeline;

pub use approval::{ApprovalCoordinator, ApprovalError};
pub use timeline::{EntryKind, Timeline, TimelineEntry, TimelineUpdate};
