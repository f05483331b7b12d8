//! In-process stand-ins for the stub server and a real upstream service

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// One stub stored by `put/stub`
#[derive(Debug, Clone)]
pub struct StoredStub {
    pub session: String,
    pub payload: Value,
    pub params: Vec<(String, String)>,
}

/// Observable state of the fake stub server
#[derive(Debug, Default)]
pub struct StubServerState {
    /// session name -> (scenario, status)
    pub sessions: HashMap<String, (String, String)>,
    pub stubs: Vec<StoredStub>,
    /// `path?query` of every call, in arrival order
    pub calls: Vec<String>,
    /// Headers of every `get/response` request
    pub lookups: Vec<HeaderMap>,
    /// `Authorization` header of every call
    pub auth: Vec<Option<String>>,
}

impl StubServerState {
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.split('?').next() == Some(path))
            .count()
    }
}

pub type SharedState = Arc<Mutex<StubServerState>>;

pub async fn spawn_stub_server() -> (SocketAddr, SharedState) {
    let state: SharedState = Arc::default();
    let shared = Arc::clone(&state);
    let addr = serve(move |req| {
        let shared = Arc::clone(&shared);
        async move { handle_stubo(req, shared).await }
    })
    .await;
    (addr, state)
}

/// Upstream echoing the request body as `{"data": <body>}`, counting hits
pub async fn spawn_upstream() -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let addr = serve(move |req| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let text = String::from_utf8_lossy(&body).into_owned();
            let mut res = Response::new(Full::new(Bytes::from(json!({ "data": text }).to_string())));
            res.headers_mut()
                .insert("content-type", "application/json".parse().unwrap());
            res
        }
    })
    .await;
    (addr, hits)
}

async fn serve<H, Fut>(handler: H) -> SocketAddr
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: std::future::Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let fut = handler(req);
                    async move { Ok::<_, Infallible>(fut.await) }
                });
                let _ = ConnectionBuilder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

fn parse_params(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            (
                urlencoding::decode(k).unwrap().into_owned(),
                urlencoding::decode(v).unwrap().into_owned(),
            )
        })
        .collect()
}

fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn ok(data: Value) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from(
        json!({ "version": "1.0", "data": data }).to_string(),
    )));
    res.headers_mut()
        .insert("content-type", "application/json".parse().unwrap());
    res.headers_mut()
        .insert("x-stubo-version", "1.0".parse().unwrap());
    res
}

fn error(message: &str) -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from(
        json!({ "version": "1.0", "error": { "code": 400, "message": message } }).to_string(),
    )));
    *res.status_mut() = StatusCode::BAD_REQUEST;
    res.headers_mut()
        .insert("content-type", "application/json; charset=UTF-8".parse().unwrap());
    res.headers_mut()
        .insert("x-stubo-version", "1.0".parse().unwrap());
    res
}

fn not_found() -> Response<Full<Bytes>> {
    let mut res = Response::new(Full::new(Bytes::from_static(b"HTTP 404: Not Found")));
    *res.status_mut() = StatusCode::NOT_FOUND;
    res.headers_mut()
        .insert("content-type", "text/plain".parse().unwrap());
    res
}

async fn handle_stubo(req: Request<Incoming>, shared: SharedState) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await.unwrap().to_bytes();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or_default().to_string();
    let params = parse_params(&query);

    let mut state = shared.lock().unwrap();
    state.calls.push(if query.is_empty() {
        path.clone()
    } else {
        format!("{path}?{query}")
    });
    state.auth.push(
        parts
            .headers
            .get("authorization")
            .map(|v| v.to_str().unwrap().to_string()),
    );

    let session = param(&params, "session").map(ToString::to_string);
    let scenario = param(&params, "scenario").map(ToString::to_string);

    match path.as_str() {
        "/stubo/api/get/status" => match session.and_then(|s| state.sessions.get(&s).cloned()) {
            Some((_, status)) => ok(json!({ "session": { "status": status } })),
            None => ok(json!({})),
        },
        "/stubo/api/delete/stubs" => {
            let scenario = scenario.unwrap_or_default();
            let doomed: Vec<String> = state
                .sessions
                .iter()
                .filter(|(_, (sc, _))| *sc == scenario)
                .map(|(name, _)| name.clone())
                .collect();
            state.stubs.retain(|s| !doomed.contains(&s.session));
            state.sessions.retain(|name, _| !doomed.contains(name));
            ok(json!({ "message": format!("deleted stubs for {scenario}") }))
        }
        "/stubo/api/begin/session" => {
            let session = session.unwrap_or_default();
            let mode = param(&params, "mode").unwrap_or_default().to_string();
            match (state.sessions.get(&session).cloned(), mode.as_str()) {
                (None, "playback") => error(&format!("session not found - {session}")),
                (Some((_, status)), "record") => {
                    error(&format!("session '{session}' already exists in {status} mode"))
                }
                _ => {
                    state
                        .sessions
                        .insert(session, (scenario.unwrap_or_default(), mode.clone()));
                    ok(json!({ "status": mode }))
                }
            }
        }
        "/stubo/api/end/session" => {
            let session = session.unwrap_or_default();
            match state.sessions.get_mut(&session) {
                Some(entry) => {
                    entry.1 = "dormant".to_string();
                    ok(json!({ "message": "Session ended" }))
                }
                None => error(&format!("session not found - {session}")),
            }
        }
        "/stubo/api/put/stub" => {
            let session = session.unwrap_or_default();
            let recording = matches!(
                state.sessions.get(&session),
                Some((_, status)) if status == "record"
            );
            if !recording {
                return error(&format!("session '{session}' is not recording"));
            }

            let payload: Value = serde_json::from_slice(&body).unwrap();
            let extra = params.into_iter().filter(|(k, _)| k != "session").collect();
            state.stubs.push(StoredStub {
                session,
                payload,
                params: extra,
            });
            ok(json!({ "message": "put stub" }))
        }
        "/stubo/api/get/response" => {
            state.lookups.push(parts.headers.clone());
            let session = session.unwrap_or_default();
            let playing = matches!(
                state.sessions.get(&session),
                Some((_, status)) if status == "playback"
            );
            if !playing {
                return error(&format!("session not found - localhost:{session}"));
            }

            let text = String::from_utf8_lossy(&body).into_owned();
            let found = state.stubs.iter().find(|stub| {
                stub.session == session
                    && stub.payload["request"]["bodyPatterns"][0]["contains"]
                        .as_array()
                        .is_some_and(|m| m.iter().all(|s| text.contains(s.as_str().unwrap())))
            });

            match found {
                Some(stub) => {
                    let response = &stub.payload["response"];
                    let body = match &response["body"] {
                        Value::String(s) => s.clone(),
                        Value::Array(lines) => lines
                            .iter()
                            .map(|l| l.as_str().unwrap_or_default())
                            .collect(),
                        _ => String::new(),
                    };
                    let status = response["status"].as_u64().unwrap_or(200) as u16;
                    let mut res = Response::new(Full::new(Bytes::from(body)));
                    *res.status_mut() = StatusCode::from_u16(status).unwrap();
                    res.headers_mut()
                        .insert("content-type", "text/html; charset=UTF-8".parse().unwrap());
                    res
                }
                None => error("E017:No matching response found"),
            }
        }
        "/stubo/api/get/stublist" => {
            let scenario = scenario.unwrap_or_default();
            let stubs: Vec<Value> = state
                .stubs
                .iter()
                .filter(|s| {
                    state
                        .sessions
                        .get(&s.session)
                        .is_some_and(|(sc, _)| *sc == scenario)
                })
                .map(|s| s.payload.clone())
                .collect();
            ok(json!({ "scenario": scenario, "stubs": stubs }))
        }
        _ => not_found(),
    }
}
