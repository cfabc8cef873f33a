pub mod aggregation;
pub mod alerts;
pub mod analysis;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod leaderboard;
pub mod merge;
pub mod roster;
pub mod schema;
pub mod selection;
pub mod session;
pub mod state;
pub mod submission;
pub mod window;

pub use config::{AuditConfig, Thresholds};
pub use db::{AuditStore, ListName};
pub use error::{AuditError, Result};
pub use schema::{AnalysisResult, AuditEntry};
pub use window::TimeWindow;
