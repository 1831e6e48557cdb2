use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

use super::envelope::{ApiError, RouteExt};
use crate::gate::Staff;
use crate::model::AdminRole;
use crate::state::AppState;

/// Any staff member.
pub struct RequireStaff(pub Staff);

/// Staff holding the admin role.
pub struct RequireAdmin(pub Staff);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireStaff {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        state
            .gate
            .authorize(&parts.headers)
            .await
            .map(RequireStaff)
            .route("gate")
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        state
            .gate
            .require(&parts.headers, AdminRole::Admin)
            .await
            .map(RequireAdmin)
            .route("gate")
    }
}
