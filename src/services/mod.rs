pub mod conflicts;
pub mod context;
pub mod deck_config;
pub mod filter;
pub mod merge;
pub mod retention;
pub mod scheduler;
pub mod selection;
pub mod skill;
pub mod stats;
pub mod sync;

pub use conflicts::{ConflictError, ConflictManager};
pub use context::{Clock, ManualClock, NoticeLevel, Notifier, QueuedNotifier, SkillProvider, SystemClock, TracingNotifier};
pub use deck_config::{ConfigRepository, DeckConfig};
pub use scheduler::{Presentation, Scheduler, SchedulerConfig, SchedulerError};
pub use stats::{StatsError, StatsRepository};
pub use sync::{SyncError, SyncReport, SyncService};
