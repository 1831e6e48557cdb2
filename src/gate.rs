//! Who may call the admin endpoints.
//!
//! A request is staff when it carries the configured bearer token, or when
//! its session cookie belongs to a user holding a role.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Serialize;
use tracing::{debug, error, warn};

use topos_auth::{extract_session, project_ref_from_url, AuthClient, JwtVerifier};

use crate::error::{Error, Result};
use crate::model::AdminRole;
use crate::store::SiteStore;

/// A signed-in user as far as the site cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub email: String,
}

/// Turns request cookies into an identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `None` when the cookies hold no valid session.
    async fn resolve(&self, cookie_header: &str) -> Option<Identity>;

    /// Revoke the session behind the cookies, if any.
    async fn sign_out(&self, cookie_header: &str) -> Result<()>;
}

/// Sessions issued by Supabase Auth.
pub struct SupabaseIdentity {
    auth: AuthClient,
    verifier: Option<JwtVerifier>,
    project_ref: Option<String>,
}

impl SupabaseIdentity {
    /// With a `jwt_secret` tokens are verified locally instead of by the Auth server.
    pub fn new(auth: AuthClient, supabase_url: &str, jwt_secret: Option<&str>) -> Self {
        Self {
            auth,
            verifier: jwt_secret.map(JwtVerifier::new),
            project_ref: project_ref_from_url(supabase_url),
        }
    }
}

#[async_trait]
impl IdentityResolver for SupabaseIdentity {
    async fn resolve(&self, cookie_header: &str) -> Option<Identity> {
        let session = extract_session(cookie_header, self.project_ref.as_deref())?;

        let email = match &self.verifier {
            Some(verifier) => match verifier.verify(&session.access_token) {
                Ok(claims) => claims.email,
                Err(err) => {
                    debug!(target: "gate", "rejected session token: {}", err);
                    None
                }
            },
            None => match self.auth.get_user(&session.access_token).await {
                Ok(user) => user.email,
                Err(err) if err.is_unauthorized() => {
                    debug!(target: "gate", "rejected session token: {}", err);
                    None
                }
                Err(err) => {
                    warn!(target: "gate", "failed to resolve session: {}", err);
                    None
                }
            },
        }?;

        Some(Identity {
            email: email.trim().to_lowercase(),
        })
    }

    async fn sign_out(&self, cookie_header: &str) -> Result<()> {
        match extract_session(cookie_header, self.project_ref.as_deref()) {
            Some(session) => Ok(self.auth.sign_out(&session.access_token).await?),
            None => Ok(()),
        }
    }
}

/// For deployments without an Auth server: nobody has a session.
pub struct NoSessions;

#[async_trait]
impl IdentityResolver for NoSessions {
    async fn resolve(&self, _cookie_header: &str) -> Option<Identity> {
        None
    }

    async fn sign_out(&self, _cookie_header: &str) -> Result<()> {
        Ok(())
    }
}

/// A caller allowed past the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staff {
    /// `None` for the bearer token.
    pub email: Option<String>,
    pub role: AdminRole,
}

/// Body of the session endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub user: Option<Identity>,
    pub role: Option<AdminRole>,
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn cookie_header(headers: &HeaderMap) -> &str {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Names of the Supabase session cookies a request carries.
pub fn session_cookie_names(headers: &HeaderMap) -> Vec<String> {
    cookie_header(headers)
        .split(';')
        .filter_map(|pair| pair.split_once('=').map(|(name, _)| name.trim()))
        .filter(|name| name.starts_with("sb-"))
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct AdminGate {
    token: Option<String>,
    identity: Arc<dyn IdentityResolver>,
    store: Arc<dyn SiteStore>,
}

impl AdminGate {
    pub fn new(token: Option<String>, identity: Arc<dyn IdentityResolver>, store: Arc<dyn SiteStore>) -> Self {
        Self {
            token: token.filter(|token| !token.is_empty()),
            identity,
            store,
        }
    }

    async fn role_of(&self, identity: &Identity) -> Option<AdminRole> {
        match self.store.role_for_email(&identity.email).await {
            Ok(role) => role,
            Err(err) => {
                error!(target: "gate", "failed to look up role of {}: {}", identity.email, err);
                None
            }
        }
    }

    /// Any staff role.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Staff> {
        if let (Some(expected), Some(presented)) = (&self.token, bearer(headers)) {
            if constant_time_eq(expected.as_bytes(), presented.as_bytes()) {
                return Ok(Staff {
                    email: None,
                    role: AdminRole::Admin,
                });
            }
        }

        let identity = self
            .identity
            .resolve(cookie_header(headers))
            .await
            .ok_or_else(|| Error::Unauthorized("Not authenticated".to_string()))?;
        let role = self
            .role_of(&identity)
            .await
            .ok_or_else(|| Error::Unauthorized("Access not approved".to_string()))?;

        Ok(Staff {
            email: Some(identity.email),
            role,
        })
    }

    /// Staff holding exactly `role`.
    pub async fn require(&self, headers: &HeaderMap, role: AdminRole) -> Result<Staff> {
        let staff = self.authorize(headers).await?;
        if staff.role != role {
            return Err(Error::Forbidden("Insufficient role".to_string()));
        }
        Ok(staff)
    }

    pub async fn session(&self, headers: &HeaderMap) -> SessionView {
        match self.identity.resolve(cookie_header(headers)).await {
            Some(identity) => {
                let role = self.role_of(&identity).await;
                SessionView {
                    user: Some(identity),
                    role,
                }
            }
            None => SessionView {
                user: None,
                role: None,
            },
        }
    }

    pub async fn sign_out(&self, headers: &HeaderMap) -> Result<()> {
        self.identity.sign_out(cookie_header(headers)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoleEntry;
    use crate::store::MemoryStore;
    use axum::http::HeaderValue;

    /// Treats the cookie `session=<email>` as a signed-in user.
    struct CookieEmail;

    #[async_trait]
    impl IdentityResolver for CookieEmail {
        async fn resolve(&self, cookie_header: &str) -> Option<Identity> {
            cookie_header.strip_prefix("session=").map(|email| Identity {
                email: email.to_string(),
            })
        }

        async fn sign_out(&self, _cookie_header: &str) -> Result<()> {
            Ok(())
        }
    }

    async fn gate() -> AdminGate {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_role(&RoleEntry {
                email: "emp@topos.example".to_string(),
                role: AdminRole::Employee,
                created_by: None,
                created_at: None,
            })
            .await
            .unwrap();
        AdminGate::new(Some("s3cret".to_string()), Arc::new(CookieEmail), store)
    }

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_bearer_token_is_admin() {
        let gate = gate().await;
        let staff = gate
            .require(&headers(header::AUTHORIZATION, "Bearer s3cret"), AdminRole::Admin)
            .await
            .unwrap();
        assert_eq!(staff.email, None);

        let err = gate
            .authorize(&headers(header::AUTHORIZATION, "Bearer nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.public_message(), "Not authenticated");
    }

    #[tokio::test]
    async fn test_session_roles() {
        let gate = gate().await;

        let staff = gate
            .authorize(&headers(header::COOKIE, "session=emp@topos.example"))
            .await
            .unwrap();
        assert_eq!(staff.role, AdminRole::Employee);

        let err = gate
            .require(&headers(header::COOKIE, "session=emp@topos.example"), AdminRole::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = gate
            .authorize(&headers(header::COOKIE, "session=stranger@topos.example"))
            .await
            .unwrap_err();
        assert_eq!(err.public_message(), "Access not approved");
    }

    #[tokio::test]
    async fn test_session_view() {
        let gate = gate().await;
        let view = gate.session(&HeaderMap::new()).await;
        assert_eq!(view.user, None);

        let view = gate
            .session(&headers(header::COOKIE, "session=emp@topos.example"))
            .await;
        assert_eq!(view.role, Some(AdminRole::Employee));
    }

    #[test]
    fn test_session_cookie_names() {
        let names = session_cookie_names(&headers(
            header::COOKIE,
            "theme=dark; sb-abcd-auth-token.0=x; sb-abcd-auth-token.1=y",
        ));
        assert_eq!(names, vec!["sb-abcd-auth-token.0", "sb-abcd-auth-token.1"]);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
