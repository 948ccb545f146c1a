use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::net::TcpListener;

const VERIFY_PATH: &str = "/recaptcha/api/siteverify";

/// A stand-in for the reCAPTCHA `siteverify` endpoint which accepts only the configured secret
/// and, optionally, a specific response token and client address.
#[derive(Clone)]
pub struct FakeRecaptcha {
    required_secret: Cow<'static, str>,
    required_response: Option<String>,
    required_remote_ip: Option<String>,
    return_invalid_response: bool,
    omit_success_field: bool,
    requests: Arc<AtomicUsize>,
}

#[derive(Deserialize)]
struct VerifyQuery {
    secret: String,
    response: String,
    #[serde(default)]
    remoteip: String,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<&'static str>,
}

impl FakeRecaptcha {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_response: None,
            required_remote_ip: None,
            return_invalid_response: false,
            omit_success_field: false,
            requests: Default::default(),
        }
    }

    pub fn require_response(self, required_response: impl AsRef<str>) -> Self {
        Self {
            required_response: Some(required_response.as_ref().into()),
            ..self
        }
    }

    pub fn require_remote_ip(self, required_remote_ip: impl AsRef<str>) -> Self {
        Self {
            required_remote_ip: Some(required_remote_ip.as_ref().into()),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn omit_success_field(self) -> Self {
        Self {
            omit_success_field: true,
            ..self
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Serves on a free local port and returns the verification URL.
    pub async fn start(&self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new()
            .route(VERIFY_PATH, get(verify))
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}{VERIFY_PATH}")
    }
}

async fn verify(State(state): State<FakeRecaptcha>, Query(query): Query<VerifyQuery>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    debug!(
        "Got verification request for response {} from {}",
        query.response, query.remoteip
    );
    if state.return_invalid_response {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response();
    }
    if state.omit_success_field {
        return Json(json!({ "hostname": "localhost" })).into_response();
    }
    let error_code = if query.secret != state.required_secret {
        Some("invalid-input-secret")
    } else if state
        .required_response
        .as_ref()
        .is_some_and(|required| *required != query.response)
        || state
            .required_remote_ip
            .as_ref()
            .is_some_and(|required| *required != query.remoteip)
    {
        Some("invalid-input-response")
    } else {
        None
    };
    Json(VerifyResponsePayload {
        success: error_code.is_none(),
        error_codes: error_code.into_iter().collect(),
    })
    .into_response()
}
