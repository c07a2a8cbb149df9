pub mod error;
pub mod handlers;
pub mod health;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use health::{determine_status, overall_status, HealthResponse, ProviderHealth};
pub use server::ApiServer;
pub use state::AppState;
