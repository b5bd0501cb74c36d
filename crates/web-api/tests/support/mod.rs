#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use config::AppConfig;
use reqwest::{Client, RequestBuilder};
use tokio::{net::TcpListener, sync::oneshot};
use uuid::Uuid;
use web_api::{router, AppState, USER_ID_HEADER};

/// 在随机端口上运行的测试服务
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    _shutdown: oneshot::Sender<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let mut config = AppConfig::default();
        config.websocket.push_timeout_ms = 200;
        let app = router(AppState::from_config(&config));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("client"),
            _shutdown: shutdown_tx,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, user_id: Uuid) -> String {
        format!("ws://{}/api/v1/ws?user_id={}", self.addr, user_id)
    }

    pub fn get(&self, user: Uuid, path: &str) -> RequestBuilder {
        self.client
            .get(self.url(path))
            .header(USER_ID_HEADER, user.to_string())
    }

    pub fn post(&self, user: Uuid, path: &str) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header(USER_ID_HEADER, user.to_string())
    }

    pub fn put(&self, user: Uuid, path: &str) -> RequestBuilder {
        self.client
            .put(self.url(path))
            .header(USER_ID_HEADER, user.to_string())
    }

    pub fn patch(&self, user: Uuid, path: &str) -> RequestBuilder {
        self.client
            .patch(self.url(path))
            .header(USER_ID_HEADER, user.to_string())
    }

    pub fn delete(&self, user: Uuid, path: &str) -> RequestBuilder {
        self.client
            .delete(self.url(path))
            .header(USER_ID_HEADER, user.to_string())
    }
}
