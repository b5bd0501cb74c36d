mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use uuid::Uuid;

use support::TestServer;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &TestServer, user: Uuid) -> Socket {
    let (mut socket, _) = connect_async(server.ws_url(user))
        .await
        .expect("websocket connect");
    let hello = next_event(&mut socket).await;
    assert_eq!(hello["type"], "connection_established");
    assert_eq!(hello["user_id"], user.to_string());
    socket
}

/// 读取下一个 JSON 文本帧，跳过控制帧
async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("event timeout")
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("event json");
        }
    }
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket
        .send(TungsteniteMessage::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

async fn create_direct(server: &TestServer, alice: Uuid, bob: Uuid) -> String {
    let dialog: Value = server
        .post(alice, "/api/v1/dialogs")
        .json(&json!({ "type": "direct", "participants": [bob] }))
        .send()
        .await
        .expect("create dialog")
        .json()
        .await
        .expect("dialog json");
    dialog["id"].as_str().expect("dialog id").to_string()
}

#[tokio::test]
async fn new_message_reaches_both_participants() {
    let server = TestServer::spawn().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let dialog_id = create_direct(&server, alice, bob).await;

    let mut alice_ws = connect(&server, alice).await;
    let mut bob_ws = connect(&server, bob).await;

    let sent: Value = server
        .post(alice, &format!("/api/v1/dialogs/{dialog_id}/messages"))
        .json(&json!({ "content": "Hello! How are you?" }))
        .send()
        .await
        .expect("send message")
        .json()
        .await
        .expect("message json");

    for socket in [&mut alice_ws, &mut bob_ws] {
        let event = next_event(socket).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["message"]["id"], sent["id"]);
        assert_eq!(event["message"]["content"], "Hello! How are you?");
        assert_eq!(event["message"]["sequence"], 1);
    }
}

#[tokio::test]
async fn ping_typing_and_bad_frames() {
    let server = TestServer::spawn().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let dialog_id = create_direct(&server, alice, bob).await;

    let mut alice_ws = connect(&server, alice).await;
    let mut bob_ws = connect(&server, bob).await;

    send_json(&mut alice_ws, json!({ "type": "ping" })).await;
    assert_eq!(next_event(&mut alice_ws).await["type"], "pong");

    send_json(
        &mut alice_ws,
        json!({ "type": "typing_start", "dialog_id": dialog_id }),
    )
    .await;
    let typing = next_event(&mut bob_ws).await;
    assert_eq!(typing["type"], "typing_indicator");
    assert_eq!(typing["user_id"], alice.to_string());
    assert_eq!(typing["is_typing"], true);

    // 无法解析的帧返回错误事件，连接保持可用
    alice_ws
        .send(TungsteniteMessage::Text("not json".into()))
        .await
        .expect("send garbage");
    let error = next_event(&mut alice_ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "INVALID_EVENT");

    // 不在会话中的输入状态被拒绝
    send_json(
        &mut alice_ws,
        json!({ "type": "typing_stop", "dialog_id": Uuid::new_v4() }),
    )
    .await;
    let error = next_event(&mut alice_ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "DIALOG_NOT_FOUND");

    send_json(&mut alice_ws, json!({ "type": "ping" })).await;
    assert_eq!(next_event(&mut alice_ws).await["type"], "pong");
}

#[tokio::test]
async fn websocket_requires_identity() {
    let server = TestServer::spawn().await;
    let url = format!("ws://{}/api/v1/ws", server.addr);
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn newer_connection_supersedes_older() {
    let server = TestServer::spawn().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let dialog_id = create_direct(&server, alice, bob).await;

    let mut first = connect(&server, bob).await;
    let mut second = connect(&server, bob).await;

    // 旧连接被服务端关闭
    let closed = timeout(Duration::from_secs(2), async {
        loop {
            match first.next().await {
                Some(Ok(TungsteniteMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    server
        .post(alice, &format!("/api/v1/dialogs/{dialog_id}/messages"))
        .json(&json!({ "content": "to the newest device" }))
        .send()
        .await
        .expect("send message");
    let event = next_event(&mut second).await;
    assert_eq!(event["type"], "new_message");

    let health: Value = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .expect("health")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["connections"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connection_established_is_first_frame_under_traffic() {
    let server = TestServer::spawn().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let dialog_id = create_direct(&server, alice, bob).await;

    // 后台持续发消息，新连接注册后立刻会有推送排队
    let url = server.url(&format!("/api/v1/dialogs/{dialog_id}/messages"));
    let senders: Vec<_> = (0..4)
        .map(|_| {
            let client = server.client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                loop {
                    let _ = client
                        .post(&url)
                        .header(web_api::USER_ID_HEADER, alice.to_string())
                        .json(&json!({ "content": "traffic" }))
                        .send()
                        .await;
                }
            })
        })
        .collect();

    for _ in 0..50 {
        let (mut socket, _) = connect_async(server.ws_url(bob))
            .await
            .expect("websocket connect");
        let first = next_event(&mut socket).await;
        assert_eq!(first["type"], "connection_established");
        assert_eq!(first["user_id"], bob.to_string());
        let _ = socket.close(None).await;
    }

    for sender in senders {
        sender.abort();
    }
}
