//! Scheduling engine
//!
//! Coordinates the feed drivers under three constraints: never lose
//! events between polls, never re-emit events already seen, and never
//! let one feed's failure contaminate another's output.
//!
//! Drivers sharing a schedule form a [`FeedGroup`], the unit of
//! execution. Groups run on cron-style timers with overlapping ticks
//! dropped, or on demand through the HTTP trigger endpoint; either way
//! a group is never invoked concurrently with itself, which is what
//! lets each feed's watermark live without a dedicated lock.

mod group;
#[cfg(test)]
mod mock;
mod schedule;
mod scheduler;
mod server;

pub use group::{FeedGroup, GroupResult, PollError, PubError};
pub use schedule::{Schedule, ScheduleError};
pub use scheduler::{build_schedules, Scheduler, SchedulerError};
