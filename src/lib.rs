pub mod analytics;
pub mod api;
pub mod config;
pub mod io;
pub mod logging;
pub mod models;
pub mod period;
pub mod pipeline;
pub mod report;

// Re-export the main error types for convenience
pub use analytics::payout::CalcError;
pub use api::auth::AuthError;
pub use api::organizer::FetchError;
pub use io::SourceError;
pub use period::PeriodError;
pub use pipeline::PipelineError;

// Re-export the pipeline surface
pub use api::organizer::{OrganizerClient, RevenueSource};
pub use api::sources::{LedgerSource, RosterSource, SourceClient};
pub use models::{Ledger, LedgerEntry, LedgerStatus, RevenueCategory, RoomId, Roster, Talent};
pub use period::Period;
pub use pipeline::{Pipeline, PipelineOptions, RunOutcome, RunWarning};
