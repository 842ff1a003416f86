//! Explicit per-request context. Every operation receives the store handle
//! and the caller's session rather than reading ambient state.

use tracing::error;
use uuid::Uuid;

use polipulse_db::Database;
use polipulse_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
}

impl From<Claims> for Session {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
        }
    }
}

pub struct RequestContext<'a> {
    pub db: &'a Database,
    pub session: Option<Session>,
}

impl<'a> RequestContext<'a> {
    pub fn new(db: &'a Database, session: Option<Session>) -> Self {
        Self { db, session }
    }

    pub fn authenticated(db: &'a Database, session: Session) -> Self {
        Self::new(db, Some(session))
    }

    pub fn anonymous(db: &'a Database) -> Self {
        Self::new(db, None)
    }

    pub fn require_user(&self) -> Result<&Session, ApiError> {
        self.session.as_ref().ok_or(ApiError::NotAuthenticated)
    }
}

/// Run an operation on the blocking pool with a context built from the
/// shared state.
pub(crate) async fn run_blocking<T, F>(state: &AppState, session: Option<Session>, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&RequestContext<'_>) -> Result<T, ApiError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || {
        let ctx = RequestContext::new(&state.db, session);
        op(&ctx)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Store(anyhow::anyhow!("blocking task failed"))
    })?
}
