use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::Secret;
use crate::db::AppState;
use crate::error::AppError;

/// Identity of an authenticated administrator, available to admin handlers
/// through `Extension<AdminContext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminContext {
    pub actor: String,
}

/// Capability check for the admin surface.
pub trait AdminVerifier: Send + Sync {
    fn authorize(&self, token: &str) -> Option<AdminContext>;
}

/// Accepts exactly one shared bearer secret.
///
/// Both sides are hashed first so the comparison runs over equal-length
/// digests regardless of the presented token.
pub struct StaticSecretVerifier {
    digest: [u8; 32],
}

impl StaticSecretVerifier {
    pub fn new(secret: &Secret) -> Self {
        Self {
            digest: Sha256::digest(secret.expose().as_bytes()).into(),
        }
    }
}

impl AdminVerifier for StaticSecretVerifier {
    fn authorize(&self, token: &str) -> Option<AdminContext> {
        let presented: [u8; 32] = Sha256::digest(token.as_bytes()).into();
        if bool::from(presented.ct_eq(&self.digest)) {
            Some(AdminContext {
                actor: "admin".to_string(),
            })
        } else {
            None
        }
    }
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::Unauthorized)?;

    let Some(context) = state.admin.authorize(auth.token()) else {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(AppError::Unauthorized);
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
