pub mod database;
pub mod schema;
pub mod store;

pub use database::{Database, ScheduleRun};
pub use store::{AgentStore, SqliteStore};
