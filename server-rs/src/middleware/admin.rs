use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::Role;

fn check_role(req: &Request, min_role: Role) -> Result<(), AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    if !user.role.at_least(min_role) {
        return Err(AppError::Forbidden(format!(
            "Requires {min_role} role or higher"
        )));
    }
    Ok(())
}

/// Middleware: any back-office role may use the roster.
/// Must run after `auth::authenticate`.
pub async fn require_roster_access(req: Request, next: Next) -> Result<Response, AppError> {
    check_role(&req, Role::MemberManager)?;
    Ok(next.run(req).await)
}
