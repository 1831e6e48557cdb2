use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use topos_site::api::router;
use topos_site::config::{SiteConfig, StoreBackend};
use topos_site::state::AppState;

const TOKEN: &str = "integration-token";

async fn spawn() -> (String, Arc<AppState>) {
    let config = SiteConfig::default()
        .with_supabase("https://abcd.supabase.co", "anon", "service")
        .with_store_backend(StoreBackend::Memory)
        .with_admin_api_token(Some(TOKEN));
    let state = AppState::new(config).unwrap();
    let app = router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", address), state)
}

struct Api {
    base: String,
    http: Client,
}

impl Api {
    async fn start() -> (Self, Arc<AppState>) {
        let (base, state) = spawn().await;
        (
            Self {
                base,
                http: Client::new(),
            },
            state,
        )
    }

    async fn call(&self, method: reqwest::Method, path: &str, body: Option<Value>, admin: bool) -> (u16, Value) {
        let mut request = self.http.request(method, format!("{}{}", self.base, path));
        if admin {
            request = request.bearer_auth(TOKEN);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        self.call(reqwest::Method::GET, path, None, true).await
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        self.call(reqwest::Method::POST, path, Some(body), true).await
    }

    async fn put(&self, path: &str, body: Value) -> (u16, Value) {
        self.call(reqwest::Method::PUT, path, Some(body), true).await
    }
}

fn project_body(slug: &str) -> Value {
    json!({
        "slug": slug,
        "name": "Alder House",
        "status": "completed",
        "isPublic": true,
        "addressLine1": "12 Alder St",
        "city": "Portland",
        "state": "OR",
        "actualCompletion": "2024-03-01",
        "units": [
            { "name": "Unit B", "unitCode": "B", "sortOrder": 1, "price": 725000 },
            {
                "name": "Unit A",
                "unitCode": "A",
                "sortOrder": 0,
                "price": 650000.5,
                "bedrooms": 2,
                "bathrooms": 2.5,
                "squareFeet": "1180",
                "description": "Corner unit"
            }
        ]
    })
}

async fn create_project(api: &Api, slug: &str) -> Value {
    let (status, body) = api.post("/api/projects", project_body(slug)).await;
    assert_eq!(status, 201, "{}", body);
    body["data"]["project"].clone()
}

fn ids(photos: &Value) -> Vec<String> {
    photos
        .as_array()
        .unwrap()
        .iter()
        .map(|photo| photo["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_healthz() {
    let (api, _state) = Api::start().await;
    let (status, body) = api.call(reqwest::Method::GET, "/healthz", None, false).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_writes_need_staff() {
    let (api, _state) = Api::start().await;
    let (status, body) = api
        .call(reqwest::Method::POST, "/api/projects", Some(project_body("alder")), false)
        .await;
    assert_eq!(status, 401);
    assert_eq!(body, json!({ "success": false, "error": "Not authenticated" }));

    let (status, _) = api
        .call(reqwest::Method::GET, "/api/gallery/photos", None, false)
        .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_project_round_trip() {
    let (api, _state) = Api::start().await;
    let project = create_project(&api, "alder").await;
    let id = project["id"].as_str().unwrap();

    let (status, body) = api.get("/api/projects/alder?include=units").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["project"]["id"], id);
    let units: Vec<&str> = body["data"]["project"]["units"]
        .as_array()
        .unwrap()
        .iter()
        .map(|unit| unit["name"].as_str().unwrap())
        .collect();
    assert_eq!(units, vec!["Unit A", "Unit B"]);
    let unit_a = &body["data"]["project"]["units"][0];
    assert_eq!(unit_a["bedrooms"], 2.0);
    assert_eq!(unit_a["bathrooms"], 2.5);
    assert_eq!(unit_a["square_feet"], 1180.0);
    assert_eq!(unit_a["price"], 650000.5);
    assert_eq!(unit_a["description"], "Corner unit");

    let (status, body) = api.get("/api/projects?status=sold").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid status filter");

    let (status, body) = api.post("/api/projects", json!({ "slug": "Bad Slug" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Invalid project payload");
    assert!(body["details"]["fieldErrors"]["slug"].is_array());

    let (status, body) = api.get("/api/public/projects/alder/units/a").await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["unit"]["name"], "Unit A");

    let (status, _) = api
        .call(reqwest::Method::DELETE, &format!("/api/projects/{}", id), None, true)
        .await;
    assert_eq!(status, 200);
    let (status, body) = api.get("/api/projects/alder").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Project not found");
}

#[tokio::test]
async fn test_upload_roles_and_reorder() {
    let (api, _state) = Api::start().await;
    let project = create_project(&api, "alder").await;
    let id = project["id"].as_str().unwrap().to_string();
    let photos_path = format!("/api/projects/{}/photos", id);

    let (status, body) = api.post(&photos_path, json!({ "filename": "x.jpg" })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "filename and contentType are required");

    let mut uploaded = Vec::new();
    for (filename, role) in [("Front Door.JPG", "hero"), ("Kitchen.jpg", "gallery"), ("Deck.jpg", "hero")] {
        let (status, body) = api
            .post(
                &photos_path,
                json!({ "filename": filename, "contentType": "image/jpeg", "role": role }),
            )
            .await;
        assert_eq!(status, 201, "{}", body);
        uploaded.push(body["data"].clone());
    }

    let upload = &uploaded[0]["upload"];
    let object_path = upload["objectPath"].as_str().unwrap();
    assert!(object_path.starts_with(&format!("projects/{}/", id)));
    assert!(object_path.ends_with("-front-door.jpg"));
    assert_eq!(upload["bucket"], "project-assets");
    assert_eq!(
        upload["publicUrl"].as_str().unwrap(),
        format!("https://abcd.supabase.co/storage/v1/object/public/project-assets/{}", object_path)
    );
    let sort_orders: Vec<i64> = uploaded
        .iter()
        .map(|slot| slot["photo"]["sort_order"].as_i64().unwrap())
        .collect();
    assert_eq!(sort_orders, vec![0, 1, 2]);

    let (_, body) = api.get(&photos_path).await;
    let photos = body["data"]["photos"].clone();
    let heroes: Vec<&Value> = photos
        .as_array()
        .unwrap()
        .iter()
        .filter(|photo| photo["role"] == "hero")
        .collect();
    assert_eq!(heroes.len(), 1);
    assert_eq!(heroes[0]["id"], uploaded[2]["photo"]["id"]);

    let mut order = ids(&photos);
    order.reverse();
    let (status, body) = api
        .post(&format!("{}/reorder", photos_path), json!({ "order": order }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!({ "reordered": true }));
    let (_, body) = api.get(&photos_path).await;
    assert_eq!(ids(&body["data"]["photos"]), order);

    let (status, body) = api
        .post(&format!("{}/reorder", photos_path), json!({ "order": [order[0], order[1]] }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "order must list every photo exactly once");
    let (_, body) = api.get(&photos_path).await;
    assert_eq!(ids(&body["data"]["photos"]), order);

    let (status, body) = api
        .put(&format!("{}/{}", photos_path, order[2]), json!({ "role": "main" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "role must be hero or gallery");
}

#[tokio::test]
async fn test_gallery_flow() {
    let (api, _state) = Api::start().await;

    let (status, body) = api
        .post(
            "/api/gallery/photos",
            json!({ "filename": "a.jpg", "contentType": "image/jpeg", "size": "huge" }),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "size must be normal, tall, or wide");

    let (status, body) = api
        .post(
            "/api/gallery/photos",
            json!({ "filename": "a.jpg", "contentType": "image/jpeg", "size": "wide" }),
        )
        .await;
    assert_eq!(status, 201);
    let photo_id = body["data"]["photo"]["id"].as_str().unwrap().to_string();
    assert!(body["data"]["upload"]["objectPath"]
        .as_str()
        .unwrap()
        .starts_with("gallery/portfolio/"));

    let (status, body) = api
        .put(&format!("/api/gallery/photos/{}", photo_id), json!({ "altText": "Living room" }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["photo"]["alt_text"], "Living room");

    let (status, body) = api
        .put(&format!("/api/gallery/photos/{}", photo_id), json!({}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "No fields to update");

    let (status, body) = api
        .call(reqwest::Method::GET, "/api/public/gallery", None, false)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["photos"][0]["alt"], "Living room");
    assert_eq!(body["data"]["photos"][0]["size"], "wide");

    let (status, _) = api
        .call(
            reqwest::Method::DELETE,
            &format!("/api/gallery/photos/{}", photo_id),
            None,
            true,
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_roles_and_access_requests() {
    let (api, _state) = Api::start().await;

    let (status, body) = api
        .post("/api/admin/roles", json!({ "email": " Emp@Topos.Example ", "role": "employee" }))
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["role"]["email"], "emp@topos.example");

    let (status, body) = api
        .post("/api/admin/roles", json!({ "email": "x@topos.example", "role": "owner" }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Valid email and role are required");

    let (status, body) = api
        .call(
            reqwest::Method::PATCH,
            "/api/admin/roles/emp%40topos.example",
            Some(json!({ "role": "admin" })),
            true,
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["data"]["role"]["role"], "admin");

    let request = json!({ "email": "New@Topos.Example", "name": "New Hire" });
    let (status, body) = api
        .call(reqwest::Method::POST, "/api/admin/access-requests", Some(request.clone()), false)
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["data"]["request"]["email"], "new@topos.example");

    let (status, body) = api
        .call(reqwest::Method::POST, "/api/admin/access-requests", Some(request), false)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!({ "request": null, "duplicate": true }));

    let (status, body) = api
        .call(
            reqwest::Method::POST,
            "/api/admin/access-requests",
            Some(json!({ "email": "a@b.c" })),
            false,
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Name and email are required");
}

#[tokio::test]
async fn test_session_and_logout() {
    let (api, _state) = Api::start().await;
    let (status, body) = api
        .call(reqwest::Method::GET, "/api/admin/session", None, false)
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!({ "user": null, "role": null }));

    let response = api
        .http
        .post(format!("{}/api/admin/logout", api.base))
        .header("Cookie", "theme=dark; sb-abcd-auth-token=abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let cookies: Vec<String> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with("sb-abcd-auth-token=;"));
    assert!(cookies[0].contains("Max-Age=0"));
}

#[tokio::test]
async fn test_contact_rate_limit() {
    let (api, _state) = Api::start().await;

    for _ in 0..3 {
        let response = api
            .http
            .post(format!("{}/api/contact", api.base))
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .json(&json!({ "name": "Sam" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    let response = api
        .http
        .post(format!("{}/api/contact", api.base))
        .header("x-forwarded-for", "203.0.113.9")
        .json(&json!({ "name": "Sam" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 429);
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 900);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Too many requests. Please try again later.");
}

#[tokio::test]
async fn test_signed_urls() {
    let (api, _state) = Api::start().await;

    let (status, body) = api.get("/api/photos/signed").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "path is required");

    let (status, body) = api.get("/api/photos/signed?path=https://cdn.test/a.jpg").await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["url"], "https://cdn.test/a.jpg");

    // Unknown objects fall back to their public URL.
    let (status, body) = api
        .post(
            "/api/photos/signed/batch",
            json!({ "paths": ["projects/p/a.jpg", "https://cdn.test/b.jpg", 7] }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        body["data"]["urls"],
        json!({
            "https://cdn.test/b.jpg": "https://cdn.test/b.jpg",
            "projects/p/a.jpg": "https://abcd.supabase.co/storage/v1/object/public/project-assets/projects/p/a.jpg"
        })
    );

    let (status, body) = api.post("/api/photos/signed/batch", json!({ "paths": [] })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "paths[] is required");
}
