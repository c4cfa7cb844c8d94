pub mod cache;
pub mod config;
pub mod error;
pub mod list;

pub use cache::EntityCache;
pub use config::AppConfig;
pub use error::KirokuError;
pub use list::{ListLoadController, ListState, LoadOutcome, LoadPhase};
