//! In-process stand-in for the Weasyl endpoints the destination adapter uses.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{json, Value};

pub const API_KEY: &str = "good-key";
pub const LOGIN: &str = "tester";
pub const UPLOADED_ID: i64 = 777;

#[derive(Default)]
pub struct FakeWeasyl {
    /// (id, title, parent id or 0)
    pub folders: Mutex<Vec<(i64, String, i64)>>,
    /// Gallery pages, served in order through `nextid`.
    pub pages: Mutex<Vec<Vec<Value>>>,
    /// (endpoint type, raw multipart body)
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
    pub created: Mutex<Vec<HashMap<String, String>>>,
}

impl FakeWeasyl {
    pub fn new(folders: &[(i64, &str, i64)], pages: Vec<Vec<Value>>) -> Arc<Self> {
        Arc::new(Self {
            folders: Mutex::new(
                folders
                    .iter()
                    .map(|(id, title, parent)| (*id, title.to_string(), *parent))
                    .collect(),
            ),
            pages: Mutex::new(pages),
            ..Self::default()
        })
    }

    pub fn upload_bodies(&self) -> Vec<(String, String)> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(kind, body)| (kind.clone(), String::from_utf8_lossy(body).into_owned()))
            .collect()
    }
}

pub fn gallery_entry(id: i64, title: &str, subtype: &str, rating: &str) -> Value {
    json!({
        "submitid": id,
        "title": title,
        "subtype": subtype,
        "rating": rating,
        "tags": ["existing"],
        "link": format!("https://www.weasyl.com/submission/{id}/x"),
    })
}

fn authorised(headers: &HeaderMap) -> Result<(), StatusCode> {
    match headers.get("x-weasyl-api-key") {
        Some(key) if key == API_KEY => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn whoami(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    authorised(&headers)?;
    Ok(Json(json!({ "login": LOGIN, "userid": 1 })))
}

async fn view(
    State(fake): State<Arc<FakeWeasyl>>,
    Path(login): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorised(&headers)?;
    if login != LOGIN {
        return Err(StatusCode::NOT_FOUND);
    }
    let folders = fake.folders.lock().unwrap();
    let tree: Vec<Value> = folders
        .iter()
        .filter(|(_, _, parent)| *parent == 0)
        .map(|(id, title, _)| {
            let subfolders: Vec<Value> = folders
                .iter()
                .filter(|(_, _, parent)| parent == id)
                .map(|(cid, ctitle, _)| json!({ "folder_id": cid, "title": ctitle, "subfolders": [] }))
                .collect();
            json!({ "folder_id": id, "title": title, "subfolders": subfolders })
        })
        .collect();
    Ok(Json(json!({ "login": LOGIN, "folders": tree })))
}

async fn gallery(
    State(fake): State<Arc<FakeWeasyl>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorised(&headers)?;
    let page: usize = params
        .get("nextid")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    let pages = fake.pages.lock().unwrap();
    let submissions = pages.get(page).cloned().unwrap_or_default();
    let nextid = (page + 1 < pages.len()).then_some(page + 1);
    Ok(Json(json!({ "submissions": submissions, "nextid": nextid })))
}

async fn create_folder(
    State(fake): State<Arc<FakeWeasyl>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, StatusCode> {
    authorised(&headers)?;
    let title = form.get("title").cloned().ok_or(StatusCode::BAD_REQUEST)?;
    let parent: i64 = form
        .get("parentid")
        .and_then(|p| p.parse().ok())
        .unwrap_or(0);
    let mut folders = fake.folders.lock().unwrap();
    let id = 500 + folders.len() as i64;
    folders.push((id, title, parent));
    fake.created.lock().unwrap().push(form);
    Ok(Redirect::to("/manage/folders"))
}

async fn submit(
    State(fake): State<Arc<FakeWeasyl>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Redirect, StatusCode> {
    authorised(&headers)?;
    let mut uploads = fake.uploads.lock().unwrap();
    uploads.push((kind, body.to_vec()));
    let id = UPLOADED_ID + uploads.len() as i64 - 1;
    Ok(Redirect::to(&format!("/submission/{id}/uploaded")))
}

async fn ok() -> &'static str {
    "ok"
}

/// Serve the fake on an ephemeral port and return its base URL.
pub async fn serve(fake: Arc<FakeWeasyl>) -> String {
    let app = Router::new()
        .route("/api/whoami", get(whoami))
        .route("/api/users/:login/view", get(view))
        .route("/api/users/:login/gallery", get(gallery))
        .route("/manage/folders/create", post(create_folder))
        .route("/manage/folders", get(ok))
        .route("/submit/:kind", post(submit))
        .route("/submission/:id/:slug", get(ok))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake server");
    });
    format!("http://{addr}")
}
