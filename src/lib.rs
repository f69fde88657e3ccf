//! Routine tracker: resolves a weekly schedule against the wall clock and
//! keeps a log of how each activity went.

pub mod clock;
pub mod config;
pub mod error;
pub mod log_store;
pub mod models;
pub mod projections;
pub mod resolver;
pub mod server;
pub mod storage;
pub mod ticker;
pub mod toc;
pub mod tracker;


pub use clock::{Clock, ClockTime, FixedClock, SystemClock};
pub use config::Config;
pub use error::{Result, TrackerError};
pub use log_store::{append_or_update_log, delete_log, LogStore};
pub use models::{DaySchedule, LogEntry, Marker, ScheduleDocument, TimeBlock, Timing};
pub use resolver::{
    resolve, resolve_current_block, resolve_current_marker, resolve_day_schedule, resolve_next_event,
    ActivityResolver, Resolution, ResolutionView,
};
pub use server::{create_router, AppState, TrackerRuntime};
pub use storage::{sync_component, MemoryStorage, SqliteStorage, Storage};
pub use ticker::ResolverTicker;
pub use tracker::TrackerForm;
