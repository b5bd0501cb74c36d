use std::sync::Arc;

use application::{
    BroadcastEngine, ChatService, ChatServiceDependencies, Clock, ConnectionRegistry,
    DialogStore, MessageStore, SystemClock,
};
use config::{AppConfig, WebSocketConfig};

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub broadcast_engine: Arc<BroadcastEngine>,
    pub connections: Arc<ConnectionRegistry>,
    pub websocket: WebSocketConfig,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        broadcast_engine: Arc<BroadcastEngine>,
        connections: Arc<ConnectionRegistry>,
        websocket: WebSocketConfig,
    ) -> Self {
        Self {
            chat_service,
            broadcast_engine,
            connections,
            websocket,
        }
    }

    /// 按配置组装全部内存组件
    pub fn from_config(config: &AppConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let dialog_store = Arc::new(DialogStore::new(clock.clone()));
        let message_store = Arc::new(MessageStore::new(dialog_store.clone(), clock));
        let connections = Arc::new(ConnectionRegistry::new(config.websocket.push_timeout()));
        let broadcast_engine = Arc::new(BroadcastEngine::new(
            connections.clone(),
            dialog_store.clone(),
        ));

        let chat_service = ChatService::new(ChatServiceDependencies {
            dialog_store,
            message_store,
            broadcaster: broadcast_engine.clone(),
            messaging: config.messaging.clone(),
        });

        Self::new(
            Arc::new(chat_service),
            broadcast_engine,
            connections,
            config.websocket.clone(),
        )
    }
}
