//! Route definitions for Conversations domain API

use axum::{
    routing::{get, patch},
    Router,
};

use super::handlers::{conversations, messages};
use super::middleware::ConversationsState;

/// Create conversation routes
fn conversation_routes() -> Router<ConversationsState> {
    Router::new()
        .route(
            "/v1/conversations",
            get(conversations::list_conversations)
                .post(conversations::create_conversation)
                .delete(conversations::clear_conversations),
        )
        .route(
            "/v1/conversations/{id}",
            get(conversations::get_conversation)
                .patch(conversations::rename_conversation)
                .delete(conversations::delete_conversation),
        )
}

/// Create message routes
fn message_routes() -> Router<ConversationsState> {
    Router::new()
        .route(
            "/v1/conversations/{conversation_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/v1/messages/{id}",
            patch(messages::edit_message).delete(messages::delete_message),
        )
}

/// Create all Conversations domain API routes
pub fn routes() -> Router<ConversationsState> {
    Router::new()
        .merge(conversation_routes())
        .merge(message_routes())
}
