//! Request sessions. Authentication happens upstream; the gateway forwards the
//! authenticated user and active household as headers.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use prixfixe::HouseholdId;

pub const USER_HEADER: &str = "x-prixfixe-user-id";
pub const HOUSEHOLD_HEADER: &str = "x-prixfixe-household-id";

/// Session used for every request when authentication is switched off and
/// no headers are supplied.
pub const DEV_USER: &str = "dev";
pub const DEV_HOUSEHOLD: HouseholdId = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub household_id: HouseholdId,
}

impl SessionContext {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers.get(USER_HEADER)?.to_str().ok()?.trim();
        if user_id.is_empty() {
            return None;
        }
        let household_id = headers
            .get(HOUSEHOLD_HEADER)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()?;
        Some(SessionContext {
            user_id: user_id.to_string(),
            household_id,
        })
    }

    fn dev() -> Self {
        SessionContext {
            user_id: DEV_USER.to_string(),
            household_id: DEV_HOUSEHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionMode {
    pub no_auth: bool,
}

/// Attach a [`SessionContext`] extension when one can be established.
/// Handlers that need a session reject requests without it.
pub async fn attach_session(
    State(mode): State<SessionMode>,
    mut request: Request,
    next: Next,
) -> Response {
    let session = SessionContext::from_headers(request.headers())
        .or_else(|| mode.no_auth.then(SessionContext::dev));
    if let Some(session) = session {
        request.extensions_mut().insert(session);
    }
    next.run(request).await
}
