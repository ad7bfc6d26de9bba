//! API route handlers

mod drafts;
mod events;
mod health;
mod intake;

pub use drafts::draft_routes;
pub use events::event_routes;
pub use health::health_routes;
pub use intake::intake_routes;
