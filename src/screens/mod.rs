pub mod dashboard;
pub mod state;

// The dashboard is split in two: `state` holds the event-driven state
// machine, `dashboard` draws it with ratatui. The terminal loop in `app`
// feeds one into the other.

pub use state::{Command, DashboardEvent, DashboardMessage, DashboardState};
