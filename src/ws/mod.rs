//! WebSocket surface of the dashboard.

mod broadcaster;
mod handler;

pub use broadcaster::{Broadcaster, DashboardFrame};
pub use handler::ws_handler;
