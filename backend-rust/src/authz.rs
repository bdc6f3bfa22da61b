//! Role-based authorization for the HTTP surface.
//!
//! Identity comes from a bearer token: cryptographically validated HS256 JWTs
//! first (secret from `DRONE_OPS_JWT_SECRET`), then the fixed development
//! token table for the local transition window. Requests without a usable
//! token are anonymous viewers; role gates reject them where a higher role is
//! required.

use std::collections::HashMap;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::handlers::AppState;

// ─── Role ladder ──────────────────────────────────────────────────────────────

/// Ordered roles; a role satisfies any requirement at or below its level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Analyst,
    Operator,
    Supervisor,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "viewer" => Some(Self::Viewer),
            "analyst" => Some(Self::Analyst),
            "operator" => Some(Self::Operator),
            "supervisor" => Some(Self::Supervisor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Analyst => "analyst",
            Self::Operator => "operator",
            Self::Supervisor => "supervisor",
            Self::Admin => "admin",
        }
    }
}

// ─── Identity ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            username: "anonymous".to_string(),
            role: Role::Viewer,
        }
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.role >= required
    }
}

// ─── Auth engine ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: u64,
}

pub struct AuthEngine {
    jwt_secret: Option<String>,
    static_tokens: HashMap<String, Identity>,
}

impl AuthEngine {
    pub fn new(jwt_secret: Option<String>) -> Self {
        // Fixed development tokens for the web dashboard transition window
        let static_tokens = [
            ("viewer123", "viewer", Role::Viewer),
            ("analyst123", "analyst", Role::Analyst),
            ("operator123", "operator", Role::Operator),
            ("supervisor123", "supervisor", Role::Supervisor),
            ("admin123", "admin", Role::Admin),
        ]
        .into_iter()
        .map(|(token, username, role)| {
            (
                token.to_string(),
                Identity {
                    username: username.to_string(),
                    role,
                },
            )
        })
        .collect();

        Self {
            jwt_secret,
            static_tokens,
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("DRONE_OPS_JWT_SECRET").ok())
    }

    /// Verify a bearer token and return its identity. JWT validation is
    /// attempted first; the static table is the insecure local fallback.
    pub fn authenticate(&self, token: &str) -> Option<Identity> {
        if let Some(identity) = self.verify_jwt(token) {
            return Some(identity);
        }
        self.static_tokens.get(token).cloned()
    }

    fn verify_jwt(&self, token: &str) -> Option<Identity> {
        let secret = self.jwt_secret.as_ref()?;
        let key = DecodingKey::from_secret(secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);

        match decode::<Claims>(token, &key, &validation) {
            Ok(data) => {
                let role = match Role::parse(&data.claims.role) {
                    Some(role) => role,
                    None => {
                        warn!("JWT for {} carries unknown role {:?}", data.claims.sub, data.claims.role);
                        return None;
                    }
                };
                Some(Identity {
                    username: data.claims.sub,
                    role,
                })
            }
            Err(_) => None,
        }
    }
}

// ─── Extractor ────────────────────────────────────────────────────────────────

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| state.auth.authenticate(token))
            .unwrap_or_else(Identity::anonymous);
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn mint(secret: &str, sub: &str, role: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as u64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn role_ladder_is_ordered() {
        assert!(Role::Admin > Role::Supervisor);
        assert!(Role::Supervisor > Role::Operator);
        assert!(Role::Operator > Role::Analyst);
        assert!(Role::Analyst > Role::Viewer);
        assert!(Identity { username: "x".into(), role: Role::Supervisor }.has_role(Role::Operator));
    }

    #[test]
    fn jwt_identity_wins_over_static_table() {
        let engine = AuthEngine::new(Some("test-secret".into()));
        let token = mint("test-secret", "supervisor-a", "supervisor");
        let identity = engine.authenticate(&token).unwrap();
        assert_eq!(identity.username, "supervisor-a");
        assert_eq!(identity.role, Role::Supervisor);
    }

    #[test]
    fn static_tokens_resolve_without_secret() {
        let engine = AuthEngine::new(None);
        let identity = engine.authenticate("operator123").unwrap();
        assert_eq!(identity.role, Role::Operator);
        assert!(engine.authenticate("garbage").is_none());
    }

    #[test]
    fn bad_signature_is_rejected() {
        let engine = AuthEngine::new(Some("right-secret".into()));
        let token = mint("wrong-secret", "op", "operator");
        assert!(engine.verify_jwt(&token).is_none());
    }
}
