use application::ConnectionHandle;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use domain::{ClientEvent, ConnectionLifecycle, ConnectionState, ServerEvent, UserId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// WebSocket 连接管理器
///
/// 封装单个 WebSocket 连接的所有状态和逻辑，包括：
/// - 连接注册与替换
/// - 推送事件写出
/// - 客户端事件（ping / 输入状态）处理
/// - 资源清理
pub struct WebSocketConnection {
    state: AppState,
    lifecycle: ConnectionLifecycle,
}

impl WebSocketConnection {
    pub fn new(state: AppState, user_id: Uuid) -> Self {
        Self {
            state,
            lifecycle: ConnectionLifecycle::new(UserId::from(user_id)),
        }
    }

    /// 运行 WebSocket 连接的主循环
    ///
    /// 注册表持有推送通道的唯一发送端：连接被新连接替换时发送端随之释放，
    /// 写任务读到通道关闭后退出。连接自身的回复（pong、错误）走独立的命令通道。
    pub async fn run(mut self, socket: WebSocket) {
        let user_id = self.lifecycle.user_id;
        let connection_id = self.lifecycle.connection_id;
        let (mut sender, mut incoming) = socket.split();

        let (event_tx, mut event_rx) =
            mpsc::channel::<ServerEvent>(self.state.websocket.channel_capacity);
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        self.state
            .connections
            .register(ConnectionHandle::new(
                connection_id,
                user_id,
                Utc::now(),
                event_tx,
            ))
            .await;

        if let Err(err) = self.lifecycle.transition(ConnectionState::Open) {
            tracing::error!(error = %err, connection_id = %connection_id, "连接状态异常");
            self.state
                .connections
                .unregister_connection(user_id, connection_id)
                .await;
            return;
        }

        // 写任务启动前直接写出，保证它是本连接收到的第一帧
        let established = ServerEvent::ConnectionEstablished {
            user_id,
            connection_id,
            server_time: Utc::now(),
        };
        let written = match Self::encode(&established) {
            Some(frame) => sender.send(frame).await.is_ok(),
            None => false,
        };
        if !written {
            tracing::warn!(
                user_id = %user_id,
                connection_id = %connection_id,
                "连接确认写出失败"
            );
            self.state
                .connections
                .unregister_connection(user_id, connection_id)
                .await;
            return;
        }

        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket 连接已建立");

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendEvent(event) => Self::encode(&event),
                        WsCommand::SendPong(data) => Some(WsMessage::Pong(data.into())),
                    },
                    event = event_rx.recv() => match event {
                        Some(event) => Self::encode(&event),
                        // 注册表已释放发送端：连接被替换或被判定为死亡
                        None => break,
                    },
                };
                let Some(frame) = frame else { continue };
                if sender.send(frame).await.is_err() {
                    tracing::warn!("Failed to write websocket frame");
                    break;
                }
            }
            let _ = sender.send(WsMessage::Close(None)).await;
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收任务：处理来自WebSocket客户端的消息
        let mut recv_task = {
            let state = self.state.clone();
            tokio::spawn(async move {
                while let Some(Ok(message)) = incoming.next().await {
                    if Self::handle_incoming(&state, user_id, message, &cmd_tx)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                tracing::debug!("WebSocket接收任务结束");
            })
        };

        // 等待任意一个任务完成（连接断开），另一个随之终止
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        self.lifecycle.begin_close();
        self.state
            .connections
            .unregister_connection(user_id, connection_id)
            .await;
        if let Err(err) = self.lifecycle.transition(ConnectionState::Closed) {
            tracing::warn!(error = %err, connection_id = %connection_id, "连接状态异常");
        }

        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket连接已断开");
    }

    fn encode(event: &ServerEvent) -> Option<WsMessage> {
        match serde_json::to_string(event) {
            Ok(json) => Some(WsMessage::Text(json.into())),
            Err(err) => {
                tracing::warn!(error = %err, event = event.kind(), "failed to serialize websocket payload");
                None
            }
        }
    }

    /// 处理来自客户端的消息，返回 `Err` 表示应结束连接
    async fn handle_incoming(
        state: &AppState,
        user_id: UserId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        let reply = match message {
            WsMessage::Close(_) => {
                tracing::info!("WebSocket收到关闭消息");
                return Err(());
            }
            WsMessage::Ping(data) => {
                tracing::debug!("收到ping消息，发送pong回应");
                WsCommand::SendPong(data.to_vec())
            }
            WsMessage::Pong(_) | WsMessage::Binary(_) => return Ok(()),
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => match Self::handle_client_event(state, user_id, event).await {
                    Some(event) => WsCommand::SendEvent(event),
                    None => return Ok(()),
                },
                Err(err) => {
                    tracing::debug!(user_id = %user_id, error = %err, "无法解析客户端消息");
                    WsCommand::SendEvent(ServerEvent::error(
                        "INVALID_EVENT",
                        format!("unrecognized event: {err}"),
                    ))
                }
            },
        };

        cmd_tx.send(reply).await.map_err(|_| {
            tracing::warn!("Failed to queue websocket reply");
        })
    }

    /// 客户端事件，返回需要回给本连接的事件
    async fn handle_client_event(
        state: &AppState,
        user_id: UserId,
        event: ClientEvent,
    ) -> Option<ServerEvent> {
        let (dialog_id, is_typing) = match event {
            ClientEvent::Ping => {
                return Some(ServerEvent::Pong {
                    server_time: Utc::now(),
                })
            }
            ClientEvent::TypingStart { dialog_id } => (dialog_id, true),
            ClientEvent::TypingStop { dialog_id } => (dialog_id, false),
        };

        match state
            .broadcast_engine
            .relay_typing(dialog_id, user_id, is_typing)
            .await
        {
            Ok(_) => None,
            Err(err) => {
                let error = ApiError::from(err);
                Some(ServerEvent::error(error.code(), error.message()))
            }
        }
    }
}

/// WebSocket 写操作命令
///
/// 连接自身产生的回复，与注册表推送的事件分开排队
#[derive(Debug)]
enum WsCommand {
    SendEvent(ServerEvent),
    SendPong(Vec<u8>),
}
