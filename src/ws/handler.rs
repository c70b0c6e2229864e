use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::SinkExt;

use crate::auth::token::{self, AuthError, Claims};
use crate::state::AppState;
use crate::ws::actor;

/// GET /ws/{token}
/// WebSocket upgrade endpoint. The bearer credential rides in the path; there
/// is no separate handshake message. On auth failure, upgrades then
/// immediately closes with a distinguishing close code (4001 expired,
/// 4002 anything else). On success, spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Path(credential): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    match authenticate(&state, &credential) {
        Ok(claims) => {
            tracing::info!(
                user_id = claims.sub,
                identity = %claims.name,
                "connection authenticated"
            );
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, claims))
        }
        Err(err) => {
            let close_code = err.close_code();
            tracing::warn!(close_code, error = %err, "connection rejected");

            // Upgrade the connection, then immediately close with the error code
            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: err.to_string().into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

/// Full credential check for a connection attempt: signature and expiry,
/// declared purpose, then the cross-check against the server-side cache of
/// the currently-valid token (a rotated-away token that still verifies must
/// not open a connection).
fn authenticate(state: &AppState, credential: &str) -> Result<Claims, AuthError> {
    let claims = token::validate_access_token(&state.jwt_secret, credential)?;

    match state.tokens.current_token(claims.sub) {
        Some(current) if current == credential => Ok(claims),
        _ => Err(AuthError::CacheMismatch),
    }
}
