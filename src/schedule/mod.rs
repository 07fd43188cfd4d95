pub mod daemon;
pub mod dispatcher;
pub mod handlers;

pub use daemon::{load_schedule_entries, ScheduleDaemon, ScheduleEntry};
pub use dispatcher::{ScheduleDispatcher, ScheduleHandler};
pub use handlers::{
    builtin_handlers, AgentCycleHandler, MemoryCleanupHandler, RelationshipSyncHandler,
    TokenResetHandler,
};
