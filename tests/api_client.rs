//! REST client calls against an in-process stub server

mod support;

use serde_json::json;
use stubo::api::{param, Operation, RequestBody};
use stubo::config::{ClientConfig, Mode};
use stubo::{StubData, StuboClient, StuboError};

use support::spawn_stub_server;

#[tokio::test]
async fn test_status_of_unknown_session() {
    let (addr, _server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    let response = client.get_status(None, Some("nope")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.data().unwrap(), json!({}));
}

#[tokio::test]
async fn test_put_and_list_stubs() {
    let (addr, server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    client.delete_stubs("sc", false).await.unwrap();
    client.begin_session("sc", "s1", Mode::Record).await.unwrap();

    let stub = StubData::with_defaults("hello", "world");
    client
        .put_stub("s1", &stub, &[param("tracking_level", "full")])
        .await
        .unwrap();
    client
        .end_session("sc", "s1", Some(Mode::Record))
        .await
        .unwrap();

    let listed = client.get_stublist("sc").await.unwrap().data().unwrap();
    let stubs = listed["stubs"].as_array().unwrap();
    assert_eq!(stubs.len(), 1);
    assert_eq!(StubData::from_payload(stubs[0].clone()).unwrap(), stub);

    let state = server.lock().unwrap();
    assert_eq!(state.calls[0], "/stubo/api/delete/stubs?scenario=sc");
    assert_eq!(
        state.stubs[0].params,
        vec![("tracking_level".to_string(), "full".to_string())]
    );
}

#[tokio::test]
async fn test_forced_delete_sends_flag() {
    let (addr, server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    client.delete_stubs("sc", true).await.unwrap();

    let state = server.lock().unwrap();
    assert_eq!(state.calls[0], "/stubo/api/delete/stubs?scenario=sc&force=true");
}

#[tokio::test]
async fn test_get_response_outside_playback_is_remote_error() {
    let (addr, _server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    let result = client.get_response("s1", "hello", &[]).await;
    match result {
        Err(StuboError::Remote { code, message }) => {
            assert_eq!(code, 400);
            assert_eq!(message, "session not found - localhost:s1");
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.text())),
    }
}

#[tokio::test]
async fn test_begin_playback_of_unknown_session_fails() {
    let (addr, _server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    let err = client
        .begin_session("sc", "nope", Mode::Playback)
        .await
        .unwrap_err();
    assert_eq!(err.remote_code(), Some(400));
}

#[tokio::test]
async fn test_get_response_after_recording() {
    let (addr, _server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    client.begin_session("sc", "s1", Mode::Record).await.unwrap();
    client
        .put_stub("s1", &StubData::with_defaults("ping", vec!["po", "ng"]), &[])
        .await
        .unwrap();
    client
        .end_session("sc", "s1", Some(Mode::Record))
        .await
        .unwrap();
    client
        .begin_session("sc", "s1", Mode::Playback)
        .await
        .unwrap();

    let response = client.get_response("s1", "say ping", &[]).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text(), "pong");
}

#[tokio::test]
async fn test_unknown_operation_passes_through() {
    let (addr, _server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    let response = client.invoke("bogus", &[], None).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(response.text(), "HTTP 404: Not Found");
}

#[tokio::test]
async fn test_call_with_json_body() {
    let (addr, server) = spawn_stub_server().await;
    let client = StuboClient::new(ClientConfig::new(addr.to_string())).unwrap();

    client
        .call(
            Operation::BeginSession,
            &[
                param("scenario", "sc"),
                param("session", "s2"),
                param("mode", "record"),
            ],
            None,
        )
        .await
        .unwrap();

    let payload = StubData::with_defaults("a", "b").payload().unwrap();
    client
        .call(
            Operation::PutStub,
            &[param("session", "s2")],
            Some(RequestBody::Json(payload.clone())),
        )
        .await
        .unwrap();

    let state = server.lock().unwrap();
    assert_eq!(state.stubs[0].payload, payload);
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let client = StuboClient::new(ClientConfig::new("127.0.0.1:9")).unwrap();
    let err = client.get_status(None, None).await.unwrap_err();
    assert!(matches!(err, StuboError::Transport(_)));
}
