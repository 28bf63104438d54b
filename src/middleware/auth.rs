use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::services::attempt_service::Caller;

const PRIVILEGED_ROLES: [&str; 1] = ["admin"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    pub fn is_privileged(&self) -> bool {
        let role = self.role.as_deref().unwrap_or_default();
        PRIVILEGED_ROLES.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// The caller identity the services work with. `sub` must be a user id.
    pub fn caller(&self) -> Result<Caller, Error> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| Error::Unauthorized("Token subject is not a user id".to_string()))?;
        Ok(Caller {
            user_id,
            is_privileged: self.is_privileged(),
        })
    }
}

#[derive(Clone)]
pub struct AuthState {
    decoding_key: Arc<DecodingKey>,
}

impl AuthState {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            decoding_key: Arc::new(DecodingKey::from_secret(jwt_secret.as_bytes())),
        }
    }

    fn decode(&self, req: &Request) -> Result<Claims, Error> {
        let header = req
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| Error::Unauthorized("missing_authorization".to_string()))?;
        let header = header
            .to_str()
            .map_err(|_| Error::Unauthorized("bad_authorization".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("unsupported_scheme".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| Error::Unauthorized("invalid_token".to_string()))?;

        // Reject tokens whose subject the services could not use.
        data.claims.caller()?;
        Ok(data.claims)
    }
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    match auth.decode(&req) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

pub async fn require_admin(State(auth): State<AuthState>, mut req: Request, next: Next) -> Response {
    match auth.decode(&req) {
        Ok(claims) if claims.is_privileged() => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Ok(claims) => {
            tracing::warn!(sub = %claims.sub, "non-admin caller hit an admin route");
            Error::Forbidden("Admin role required".to_string()).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: Option<&str>) -> Claims {
        Claims {
            sub: sub.to_string(),
            exp: usize::MAX,
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn admin_role_is_privileged_in_any_case() {
        let id = Uuid::new_v4().to_string();
        assert!(claims(&id, Some("ADMIN")).is_privileged());
        assert!(!claims(&id, Some("student")).is_privileged());
        assert!(!claims(&id, None).is_privileged());
    }

    #[test]
    fn caller_requires_uuid_subject() {
        let id = Uuid::new_v4();
        let caller = claims(&id.to_string(), Some("admin")).caller().unwrap();
        assert_eq!(caller.user_id, id);
        assert!(caller.is_privileged);

        assert!(matches!(
            claims("someone", None).caller(),
            Err(Error::Unauthorized(_))
        ));
    }
}
