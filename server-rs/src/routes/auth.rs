use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;

use crate::config::Credential;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{generate_token, AuthUser};
use crate::middleware::rate_limit::client_ip;
use crate::models::{LoginRequest, SessionUser};
use crate::AppState;

fn find_credential<'a>(users: &'a [Credential], username: &str, password: &str) -> Option<&'a Credential> {
    let user = users.iter().find(|u| u.username == username)?;
    match bcrypt::verify(password, &user.password_hash) {
        Ok(true) => Some(user),
        Ok(false) => None,
        Err(e) => {
            tracing::error!(username, "Stored password hash is unusable: {e}");
            None
        }
    }
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.auth.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.config.is_production())
        .max_age(time::Duration::seconds(state.config.jwt.expiry_secs))
        .build()
}

pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<Response> {
    let ip = client_ip(peer.map(|ConnectInfo(addr)| addr), &headers);
    let attempt = state.login_limiter.check(&format!("login:{ip}")).await;
    if !attempt.allowed {
        tracing::warn!(%ip, "Login rate limit exceeded");
        return Err(AppError::RateLimited {
            reset_at: attempt.reset_time(),
        });
    }

    let (username, password) = match (body.username, body.password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => (u.trim().to_string(), p),
        _ => {
            return Err(AppError::BadRequest(
                "Username and password are required".into(),
            ))
        }
    };

    let Some(user) = find_credential(&state.config.auth.users, &username, &password) else {
        tracing::warn!(%ip, %username, remaining = attempt.remaining, "Rejected login");
        tokio::time::sleep(Duration::from_millis(state.config.auth.failure_delay_ms)).await;
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Invalid username or password",
                "remaining": attempt.remaining,
            })),
        )
            .into_response());
    };

    let token = generate_token(
        &user.username,
        user.role,
        &state.config.jwt.secret,
        state.config.jwt.expiry_secs,
    )?;
    tracing::info!(%ip, username = %user.username, role = %user.role, "Login succeeded");

    let session = SessionUser {
        username: user.username.clone(),
        role: user.role,
    };
    let jar = jar.add(session_cookie(&state, token.clone()));
    Ok((
        jar,
        Json(json!({
            "success": true,
            "token": token,
            "user": session,
        })),
    )
        .into_response())
}

pub async fn verify(Extension(user): Extension<AuthUser>) -> Json<serde_json::Value> {
    Json(json!({
        "authenticated": true,
        "user": SessionUser::from(&user),
    }))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = jar.remove(Cookie::build(state.config.auth.cookie_name.clone()).path("/"));
    (jar, Json(json!({ "success": true }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn credentials_are_checked_against_bcrypt_hashes() {
        let users = vec![Credential {
            username: "sensei".into(),
            password_hash: bcrypt::hash("dojo-pass", 4).unwrap(),
            role: Role::Admin,
        }];

        assert_eq!(
            find_credential(&users, "sensei", "dojo-pass").map(|u| u.role),
            Some(Role::Admin)
        );
        assert!(find_credential(&users, "sensei", "wrong").is_none());
        assert!(find_credential(&users, "nobody", "dojo-pass").is_none());
    }

    #[test]
    fn malformed_hash_is_a_failed_login() {
        let users = vec![Credential {
            username: "sensei".into(),
            password_hash: "not-a-bcrypt-hash".into(),
            role: Role::Admin,
        }];
        assert!(find_credential(&users, "sensei", "anything").is_none());
    }
}
