use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEMO_EMAIL: &str = "demo@bank.test";
pub const DEMO_PASSWORD: &str = "password123";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub holder_name: String,
    pub last4: String,
    pub status: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub read: bool,
}

#[derive(Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPassword {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(Serialize, Deserialize)]
pub struct Token {
    pub token: String,
}

#[derive(Default)]
pub struct Backend {
    pub cards: RwLock<HashMap<Uuid, Card>>,
    pub notifications: RwLock<HashMap<Uuid, Notification>>,
    pub sessions: RwLock<HashSet<String>>,
    passwords: RwLock<HashMap<String, String>>,
}

pub type Db = Arc<Backend>;

/// Backend seeded with the demo user, two cards and one notification.
pub fn seeded() -> Db {
    let cards = [
        ("Ada Lovelace", "4242"),
        ("Ada Lovelace", "1881"),
    ]
    .into_iter()
    .map(|(holder, last4)| Card {
        id: Uuid::new_v4(),
        holder_name: holder.to_string(),
        last4: last4.to_string(),
        status: "active".to_string(),
    })
    .map(|c| (c.id, c))
    .collect();

    let welcome = Notification {
        id: Uuid::new_v4(),
        title: "Welcome".to_string(),
        body: "Your account is ready".to_string(),
        read: false,
    };

    Arc::new(Backend {
        cards: RwLock::new(cards),
        notifications: RwLock::new(HashMap::from([(welcome.id, welcome)])),
        sessions: RwLock::new(HashSet::new()),
        passwords: RwLock::new(HashMap::from([(
            DEMO_EMAIL.to_string(),
            DEMO_PASSWORD.to_string(),
        )])),
    })
}

pub fn app() -> Router {
    app_with(seeded())
}

pub fn app_with(db: Db) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/set-password", post(set_password))
        .route("/cards", get(list_cards))
        .route("/cards/{id}", get(get_card))
        .route("/cards/{id}/freeze", patch(freeze_card))
        .route("/cards/{id}/unfreeze", patch(unfreeze_card))
        .route("/notification", get(list_notifications))
        .route("/notification/{id}/read", patch(mark_read))
        .with_state(db);
    Router::new().nest("/api", api)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn login(State(db): State<Db>, Json(input): Json<Login>) -> Result<Json<Token>, StatusCode> {
    let passwords = db.passwords.read().await;
    if passwords.get(&input.email) != Some(&input.password) {
        tracing::debug!(email = %input.email, "rejected login");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(open_session(&db).await))
}

async fn set_password(
    State(db): State<Db>,
    Json(input): Json<SetPassword>,
) -> Result<Json<Token>, StatusCode> {
    if input.otp.len() != 6 || !input.otp.chars().all(|c| c.is_ascii_digit()) {
        return Err(StatusCode::BAD_REQUEST);
    }
    db.passwords
        .write()
        .await
        .insert(input.email, input.new_password);
    Ok(Json(open_session(&db).await))
}

async fn open_session(db: &Backend) -> Token {
    let token = Uuid::new_v4().simple().to_string();
    db.sessions.write().await.insert(token.clone());
    Token { token }
}

async fn authorize(db: &Backend, headers: &HeaderMap) -> Result<(), StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if db.sessions.read().await.contains(token) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

async fn list_cards(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<Card>>, StatusCode> {
    authorize(&db, &headers).await?;
    let cards = db.cards.read().await;
    Ok(Json(cards.values().cloned().collect()))
}

async fn get_card(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Card>, StatusCode> {
    authorize(&db, &headers).await?;
    let cards = db.cards.read().await;
    cards.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn freeze_card(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Card>, StatusCode> {
    set_card_status(&db, &headers, id, "frozen").await
}

async fn unfreeze_card(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Card>, StatusCode> {
    set_card_status(&db, &headers, id, "active").await
}

async fn set_card_status(
    db: &Backend,
    headers: &HeaderMap,
    id: Uuid,
    status: &str,
) -> Result<Json<Card>, StatusCode> {
    authorize(db, headers).await?;
    let mut cards = db.cards.write().await;
    let card = cards.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    card.status = status.to_string();
    Ok(Json(card.clone()))
}

async fn list_notifications(
    State(db): State<Db>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    authorize(&db, &headers).await?;
    let notifications = db.notifications.read().await;
    Ok(Json(notifications.values().cloned().collect()))
}

async fn mark_read(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, StatusCode> {
    authorize(&db, &headers).await?;
    let mut notifications = db.notifications.write().await;
    let notification = notifications.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    notification.read = true;
    Ok(Json(notification.clone()))
}
