mod chat_service;

pub use chat_service::{
    AssignRoleRequest, ChatService, ChatServiceDependencies, CreateDialogRequest,
    EditMessageRequest, GetMessagesRequest, ListDialogsRequest, SendMessageRequest,
};
