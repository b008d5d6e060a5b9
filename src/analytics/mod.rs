pub mod calendar;
mod dto;
pub mod engine;
pub mod handlers;
pub mod service;

use crate::state::AppState;
use axum::Router;

pub use service::AnalyticsService;

pub fn router() -> Router<AppState> {
    handlers::analytics_routes()
}
