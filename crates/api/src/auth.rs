//! Bearer-token auth middleware (spec §6: "all write endpoints require a
//! bearer session token" — applied here to the whole `/v1` surface, since
//! every route either mutates state or discloses another user's data).
//! Delegates to the injected `engine::collaborators::VerifySession`; real
//! session minting is out of scope (spec §1).

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{error::ApiError, AppState};

pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let session = state.session_verifier.verify(token).await.ok_or(ApiError::Unauthorized)?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}
