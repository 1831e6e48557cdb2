//! HTTP surface.

mod admin;
mod contact;
pub mod envelope;
pub mod extract;
mod photos;
mod projects;
mod public;
mod signed;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    response::Response,
    routing::{delete, get, patch, post, put},
    Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use envelope::ok;

async fn healthz() -> Response {
    ok(json!({ "status": "ok" }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/projects", get(projects::list).post(projects::create))
        .route(
            "/api/projects/:id",
            get(projects::get).put(projects::update).delete(projects::delete),
        )
        .route("/api/projects/:id/units", post(projects::add_units))
        .route(
            "/api/projects/:id/units/:unit_id",
            put(projects::update_unit).delete(projects::delete_unit),
        )
        .route(
            "/api/projects/:id/photos",
            get(photos::list_project_photos).post(photos::upload_project_photo),
        )
        .route("/api/projects/:id/photos/reorder", post(photos::reorder_project_photos))
        .route(
            "/api/projects/:id/photos/:photo_id",
            put(photos::update_project_photo).delete(photos::delete_project_photo),
        )
        .route(
            "/api/projects/units/:unit_id/photos",
            get(photos::list_unit_photos).post(photos::upload_unit_photo),
        )
        .route(
            "/api/projects/units/:unit_id/photos/reorder",
            post(photos::reorder_unit_photos),
        )
        .route(
            "/api/projects/units/:unit_id/photos/:photo_id",
            put(photos::update_unit_photo).delete(photos::delete_unit_photo),
        )
        .route(
            "/api/gallery/photos",
            get(photos::list_gallery).post(photos::upload_gallery_photo),
        )
        .route("/api/gallery/photos/reorder", post(photos::reorder_gallery))
        .route(
            "/api/gallery/photos/:photo_id",
            put(photos::update_gallery_photo).delete(photos::delete_gallery_photo),
        )
        .route("/api/photos/signed", get(signed::sign))
        .route("/api/photos/signed/batch", post(signed::sign_batch))
        .route("/api/admin/roles", get(admin::list_roles).post(admin::save_role))
        .route(
            "/api/admin/roles/:email",
            patch(admin::update_role).delete(admin::delete_role),
        )
        .route(
            "/api/admin/access-requests",
            get(admin::list_access_requests).post(admin::request_access),
        )
        .route(
            "/api/admin/access-requests/:id",
            delete(admin::delete_access_request),
        )
        .route("/api/admin/session", get(admin::session))
        .route("/api/admin/logout", post(admin::logout))
        .route("/api/contact", post(contact::submit))
        .route("/api/public/projects", get(public::projects))
        .route("/api/public/projects/:slug", get(public::project_page))
        .route("/api/public/projects/:slug/units/:unit_slug", get(public::unit_page))
        .route("/api/public/showcase", get(public::showcase))
        .route("/api/public/showcase/:status/units/:slug", get(public::showcase_unit))
        .route("/api/public/gallery", get(public::gallery))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
