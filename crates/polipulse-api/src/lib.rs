pub mod audit;
pub mod auth;
pub mod compliance;
pub mod context;
pub mod conversations;
pub mod directory;
pub mod error;
pub mod messages;
pub mod middleware;

#[cfg(test)]
mod testing;

pub use auth::{AppState, AppStateInner};
pub use context::{RequestContext, Session};
pub use error::ApiError;
