//! HTTP boundary: maps requests to commands and publishes them.
//!
//! ## Routes (mounted under `/methods`)
//!
//! - `GET /methods`: liveness text with the topic name.
//! - `POST /methods`: `CreateMethod`, body `{creator, name, applicationRate}`.
//! - `POST /methods/CreateMethods`: `CreateMethods`, body `[{...}, ...]`.
//! - `DELETE /methods/{id}`: `DeleteMethod`.
//! - `POST /methods/DeleteMethods`: `DeleteMethods`, body `[id, ...]`.
//! - `PUT /methods/{id}`: `UpdateMethod`, body `{creator, name}`.
//!
//! Every command route needs `Authorization: Bearer <jwt>`. Accepted requests
//! answer `202` right away with the saga id; the outcome arrives later as an
//! event on the topic.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    Command, CreateMethod, CreateMethods, DeleteMethod, DeleteMethods, Meta, MethodDraft,
    MethodId, Producer, SagaId, UpdateMethod, UserId,
};

/// Claims checked, in order, for the caller's user id.
const USER_ID_CLAIMS: [&str; 3] = ["nameid", "sub", "userId"];

#[derive(Clone)]
pub struct AppState {
    producer: Producer,
    topic: Arc<str>,
}

impl AppState {
    pub fn new(producer: Producer, topic: impl Into<Arc<str>>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/methods", get(status).post(create_method))
        .route("/methods/CreateMethods", post(create_methods))
        .route("/methods/DeleteMethods", post(delete_methods))
        .route("/methods/{id}", put(update_method).delete(delete_method))
        .with_state(state)
}

/// Body of `202 Accepted` responses.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub message: String,
    pub saga_id: SagaId,
}

/// Body of `PUT /methods/{id}`. Only creator and name can change.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodUpdate {
    pub creator: String,
    pub name: String,
}

/// Requester identity taken from the bearer token.
///
/// The token is not verified; its payload is only decoded to read the user
/// id claim. Any problem rejects the request with `401`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedInUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for LoggedInUser {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        match user_id_from_bearer(header) {
            Some(id) => Ok(LoggedInUser(id)),
            None => {
                warn!("Rejected request with unusable bearer token");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

fn user_id_from_bearer(header: &str) -> Option<UserId> {
    let token = header.strip_prefix("Bearer ")?.trim();
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    USER_ID_CLAIMS
        .iter()
        .find_map(|claim| match claims.get(claim)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
}

fn accept(state: &AppState, command: Command, saga_id: SagaId) -> Response {
    state.producer.publish(&command, &state.topic);
    debug!(%saga_id, topic = %state.topic, "Accepted request");
    (
        StatusCode::ACCEPTED,
        Json(Accepted {
            message: "Currently processing your request...".to_string(),
            saga_id,
        }),
    )
        .into_response()
}

async fn status(State(state): State<AppState>) -> String {
    format!("Up and running...{}", state.topic)
}

async fn create_method(
    State(state): State<AppState>,
    LoggedInUser(user): LoggedInUser,
    Json(method): Json<MethodDraft>,
) -> Response {
    let meta = Meta::new(user);
    let saga_id = meta.saga_id;
    accept(
        &state,
        Command::CreateMethod(CreateMethod { method, meta }),
        saga_id,
    )
}

async fn create_methods(
    State(state): State<AppState>,
    LoggedInUser(user): LoggedInUser,
    Json(methods): Json<Vec<MethodDraft>>,
) -> Response {
    let meta = Meta::new(user);
    let saga_id = meta.saga_id;
    accept(
        &state,
        Command::CreateMethods(CreateMethods { methods, meta }),
        saga_id,
    )
}

async fn delete_method(
    State(state): State<AppState>,
    LoggedInUser(user): LoggedInUser,
    Path(id): Path<MethodId>,
) -> Response {
    let meta = Meta::new(user);
    let saga_id = meta.saga_id;
    accept(
        &state,
        Command::DeleteMethod(DeleteMethod { id, meta }),
        saga_id,
    )
}

async fn delete_methods(
    State(state): State<AppState>,
    LoggedInUser(user): LoggedInUser,
    Json(ids): Json<Vec<MethodId>>,
) -> Response {
    let meta = Meta::new(user);
    let saga_id = meta.saga_id;
    accept(
        &state,
        Command::DeleteMethods(DeleteMethods { ids, meta }),
        saga_id,
    )
}

async fn update_method(
    State(state): State<AppState>,
    LoggedInUser(user): LoggedInUser,
    Path(id): Path<MethodId>,
    Json(update): Json<MethodUpdate>,
) -> Response {
    let meta = Meta::new(user);
    let saga_id = meta.saga_id;
    accept(
        &state,
        Command::UpdateMethod(UpdateMethod {
            id,
            creator: update.creator,
            name: update.name,
            meta,
        }),
        saga_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, InMemoryBroker, Label, Message, RetryPolicy};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::json;
    use tower::ServiceExt;

    fn token(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("Bearer {header}.{payload}.c2lnbmF0dXJl")
    }

    fn app() -> (Router, Producer, InMemoryBroker) {
        let broker = InMemoryBroker::new();
        let producer = Producer::new(Arc::new(broker.clone()), RetryPolicy::default());
        let router = router(AppState::new(producer.clone(), "methods"));
        (router, producer, broker)
    }

    fn request(method: Method, uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn published(producer: &Producer, broker: &InMemoryBroker) -> Vec<Command> {
        producer.flush().await;
        broker
            .records("methods")
            .await
            .iter()
            .map(|r| Command::decode(Envelope::from_bytes(r).unwrap()).unwrap().unwrap())
            .collect()
    }

    #[test]
    fn test_user_id_claims() {
        assert_eq!(user_id_from_bearer(&token(json!({ "nameid": "42" }))), Some(42));
        assert_eq!(user_id_from_bearer(&token(json!({ "sub": 7 }))), Some(7));
        assert_eq!(user_id_from_bearer(&token(json!({ "userId": "9" }))), Some(9));
        assert_eq!(user_id_from_bearer(&token(json!({ "nameid": "bob" }))), None);
        assert_eq!(user_id_from_bearer(&token(json!({ "email": "a@b" }))), None);
        assert_eq!(user_id_from_bearer("Bearer not-a-jwt"), None);
        assert_eq!(user_id_from_bearer("Basic Zm9vOmJhcg=="), None);
    }

    #[tokio::test]
    async fn test_status() {
        let (app, _, _) = app();
        let response = app
            .oneshot(request(Method::GET, "/methods", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Up and running...methods");
    }

    #[tokio::test]
    async fn test_create_method_is_accepted_and_published() {
        let (app, producer, broker) = app();
        let auth = token(json!({ "nameid": "12" }));
        let response = app
            .oneshot(request(
                Method::POST,
                "/methods",
                Some(&auth),
                Some(json!({ "creator": "alice", "name": "drip", "applicationRate": 0.5 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let accepted: Accepted = serde_json::from_slice(&body).unwrap();
        assert_eq!(accepted.message, "Currently processing your request...");

        let commands = published(&producer, &broker).await;
        assert_eq!(commands.len(), 1);
        let Command::CreateMethod(create) = &commands[0] else {
            panic!("expected CreateMethod, got {:?}", commands[0]);
        };
        assert_eq!(create.method.creator, "alice");
        assert_eq!(create.meta.logged_in_user_id, 12);
        assert_eq!(commands[0].meta().saga_id, accepted.saga_id);
    }

    #[tokio::test]
    async fn test_batch_and_path_routes() {
        let (app, producer, broker) = app();
        let auth = token(json!({ "sub": 3 }));

        let requests = vec![
            request(
                Method::POST,
                "/methods/CreateMethods",
                Some(&auth),
                Some(json!([{ "creator": "alice", "name": "drip", "applicationRate": 0.5 }])),
            ),
            request(Method::DELETE, "/methods/5", Some(&auth), None),
            request(
                Method::POST,
                "/methods/DeleteMethods",
                Some(&auth),
                Some(json!([1, 2])),
            ),
            request(
                Method::PUT,
                "/methods/5",
                Some(&auth),
                Some(json!({ "creator": "bob", "name": "spray", "applicationRate": 0.3 })),
            ),
        ];
        for req in requests {
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::ACCEPTED);
        }

        let mut commands = published(&producer, &broker).await;
        // Publishes may land in any order.
        commands.sort_by_key(|c| c.label());
        let labels: Vec<_> = commands.iter().map(|c| c.label()).collect();
        assert_eq!(
            labels,
            vec!["CreateMethods", "DeleteMethod", "DeleteMethods", "UpdateMethod"]
        );
        assert!(commands.iter().all(|c| c.meta().logged_in_user_id == 3));
        assert!(matches!(&commands[1], Command::DeleteMethod(d) if d.id == 5));
        assert!(matches!(&commands[2], Command::DeleteMethods(d) if d.ids == vec![1, 2]));
        assert!(matches!(
            &commands[3],
            Command::UpdateMethod(u) if u.id == 5 && u.creator == "bob" && u.name == "spray"
        ));
    }

    #[tokio::test]
    async fn test_missing_or_bad_token_is_unauthorized() {
        let (app, producer, broker) = app();
        let body = json!({ "creator": "alice", "name": "drip", "applicationRate": 0.5 });

        let bad = token(json!({ "nameid": "not a number" }));
        for auth in [None, Some("Bearer abc"), Some(bad.as_str())] {
            let response = app
                .clone()
                .oneshot(request(Method::POST, "/methods", auth, Some(body.clone())))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        assert!(published(&producer, &broker).await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_path_id_is_rejected() {
        let (app, producer, broker) = app();
        let auth = token(json!({ "nameid": 1 }));
        let response = app
            .oneshot(request(Method::DELETE, "/methods/abc", Some(&auth), None))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert!(published(&producer, &broker).await.is_empty());
    }
}
