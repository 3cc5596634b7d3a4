// Shared test helpers: a scripted in-memory transport

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bearer_client::{
    ApiRequest, ApiResponse, ClientConfig, Credentials, Transport, TransportError,
    TransportErrorKind,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;

pub const BASE_URL: &str = "https://api.test";
pub const TOKEN_PATH: &str = "/oauth/token";

/// What the fake server does with one request
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, String),
    Text(u16, String),
    Fail(TransportErrorKind),
    Delayed(Duration, Box<Reply>),
    WithHeader(&'static str, String, Box<Reply>),
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Reply::Json(status, body.to_string())
    }

    pub fn text(status: u16, body: &str) -> Self {
        Reply::Text(status, body.to_string())
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }

    pub fn with_header(self, name: &'static str, value: &str) -> Self {
        Reply::WithHeader(name, value.to_string(), Box::new(self))
    }
}

pub fn token_reply(access: &str, refresh: Option<&str>) -> Reply {
    let body = match refresh {
        Some(r) => serde_json::json!({
            "access_token": access,
            "refresh_token": r,
            "expires_in": 3600,
            "token_type": "Bearer"
        }),
        None => serde_json::json!({
            "access_token": access,
            "expires_in": 3600,
            "token_type": "Bearer"
        }),
    };
    Reply::Json(200, body.to_string())
}

/// Token reply with an explicit lifetime in seconds
pub fn short_token_reply(access: &str, refresh: &str, expires_in: i64) -> Reply {
    let body = serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "token_type": "Bearer"
    });
    Reply::Json(200, body.to_string())
}

type Handler = Box<dyn Fn(&ApiRequest) -> Reply + Send + Sync>;

/// Scripted transport
/// Routes token endpoint calls and API calls to separate handlers and
/// records what it saw.
pub struct ScriptedTransport {
    token_handler: Handler,
    api_handler: Handler,
    pub token_calls: AtomicUsize,
    pub api_calls: AtomicUsize,
    pub token_bodies: Mutex<Vec<String>>,
    pub api_auth_headers: Mutex<Vec<Option<String>>>,
}

impl ScriptedTransport {
    pub fn new(
        token_handler: impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static,
        api_handler: impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static,
    ) -> Self {
        Self {
            token_handler: Box::new(token_handler),
            api_handler: Box::new(api_handler),
            token_calls: AtomicUsize::new(0),
            api_calls: AtomicUsize::new(0),
            token_bodies: Mutex::new(Vec::new()),
            api_auth_headers: Mutex::new(Vec::new()),
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn seen_auth(&self) -> Vec<Option<String>> {
        self.api_auth_headers.lock().unwrap().clone()
    }

    pub fn seen_token_bodies(&self) -> Vec<String> {
        self.token_bodies.lock().unwrap().clone()
    }
}

/// Handler answering from a fixed queue, then repeating the last reply
pub fn queue(replies: Vec<Reply>) -> impl Fn(&ApiRequest) -> Reply + Send + Sync + 'static {
    let last = replies
        .last()
        .cloned()
        .unwrap_or_else(|| Reply::text(500, "no reply scripted"));
    let replies = Mutex::new(VecDeque::from(replies));
    move |_req: &ApiRequest| replies.lock().unwrap().pop_front().unwrap_or_else(|| last.clone())
}

pub fn auth_header(req: &ApiRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let reply = if request.url().path() == TOKEN_PATH {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            let body = request
                .body_bytes()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            self.token_bodies.lock().unwrap().push(body);
            (self.token_handler)(&request)
        } else {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            self.api_auth_headers
                .lock()
                .unwrap()
                .push(auth_header(&request));
            (self.api_handler)(&request)
        };

        resolve(reply).await
    }
}

async fn resolve(mut reply: Reply) -> Result<ApiResponse, TransportError> {
    let mut extra = HeaderMap::new();
    loop {
        match reply {
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
            Reply::WithHeader(name, value, inner) => {
                extra.insert(name, HeaderValue::from_str(&value).unwrap());
                reply = *inner;
            }
            _ => break,
        }
    }

    let (status, mut headers, body) = match reply {
        Reply::Json(status, body) => {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            (status, headers, body)
        }
        Reply::Text(status, body) => (status, HeaderMap::new(), body),
        Reply::Fail(kind) => return Err(TransportError::new(kind, "scripted failure")),
        Reply::Delayed(..) | Reply::WithHeader(..) => unreachable!(),
    };
    headers.extend(extra);

    Ok(ApiResponse::new(
        StatusCode::from_u16(status).unwrap(),
        headers,
        body,
    ))
}

/// Config with fast backoff for tests
pub fn test_config() -> ClientConfig {
    ClientConfig::new(BASE_URL, Credentials::new("client-1", "s3cret").unwrap())
        .unwrap()
        .with_max_retries(3)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(10))
        .with_request_timeout(Duration::from_secs(5))
}
