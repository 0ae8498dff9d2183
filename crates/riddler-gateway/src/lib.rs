mod error;
mod routes;
mod server;
mod state;
mod sweeper;

pub use error::ApiError;
pub use server::GatewayServer;
pub use state::AppState;
pub use sweeper::SessionSweeper;
