//! Monthly and yearly summaries of a user's income and expenses.

mod aggregation;
mod handlers;

pub use handlers::{get_dashboard_endpoint, get_history_endpoint};
