//! Message handler integration tests

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use crate::common::{authed_request, id_of, parse_body, TestApp};

mod test_send_message {
    use super::*;

    #[tokio::test]
    async fn test_send_returns_stored_user_message() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;

        let body = app.send_message(owner, &id_of(&conv), "Hello").await;

        assert_eq!(body["role"], "user");
        assert_eq!(body["content"], "Hello");
        assert_eq!(body["status"], "delivered");
        assert_eq!(body["metadata"], json!({ "type": "text" }));
        assert_eq!(body["edit_history"], json!([]));
        assert_eq!(body["conversation_id"], conv["id"]);
        assert!(body["edited_at"].is_null());
        assert!(body["deleted_at"].is_null());
    }

    #[tokio::test]
    async fn test_send_with_link_metadata() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;

        let resp = app
            .send(authed_request(
                Method::POST,
                &format!("/v1/conversations/{}/messages", id_of(&conv)),
                owner,
                Some(json!({
                    "content": "see this",
                    "metadata": { "type": "link", "url": "https://example.com" }
                })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body = parse_body(resp).await;
        assert_eq!(body["metadata"]["type"], "link");
        assert_eq!(body["metadata"]["url"], "https://example.com");
    }

    #[tokio::test]
    async fn test_send_reserved_deleted_metadata_returns_400() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;

        let resp = app
            .send(authed_request(
                Method::POST,
                &format!("/v1/conversations/{}/messages", id_of(&conv)),
                owner,
                Some(json!({ "content": "x", "metadata": { "type": "deleted" } })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_whitespace_content_returns_400() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;

        let resp = app
            .send(authed_request(
                Method::POST,
                &format!("/v1/conversations/{}/messages", id_of(&conv)),
                owner,
                Some(json!({ "content": "   " })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(app.store.message_count().unwrap(), 0);
        assert_eq!(app.pipeline.stats().scheduled, 0);
    }

    #[tokio::test]
    async fn test_send_to_other_owners_conversation_returns_404() {
        let app = TestApp::new();
        let conv = app.create_conversation(Uuid::new_v4(), None).await;

        let resp = app
            .send(authed_request(
                Method::POST,
                &format!("/v1/conversations/{}/messages", id_of(&conv)),
                Uuid::new_v4(),
                Some(json!({ "content": "intrusion" })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(app.store.message_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_succeeds_when_activity_refresh_fails() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        app.store.fail_touches(true);

        let body = app.send_message(owner, &id_of(&conv), "still works").await;
        assert_eq!(body["content"], "still works");
    }
}

mod test_list_messages {
    use super::*;

    #[tokio::test]
    async fn test_list_in_creation_order_with_replies() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let id = id_of(&conv);

        app.send_message(owner, &id, "first").await;
        app.settle().await;
        app.send_message(owner, &id, "second").await;
        app.settle().await;

        let messages = app.list_messages(owner, &id).await;
        let roles: Vec<&str> = messages
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
        assert_eq!(messages[0]["content"], "first");
        assert_eq!(messages[2]["content"], "second");
    }

    #[tokio::test]
    async fn test_list_other_owners_conversation_returns_404() {
        let app = TestApp::new();
        let conv = app.create_conversation(Uuid::new_v4(), None).await;

        let resp = app
            .send(authed_request(
                Method::GET,
                &format!("/v1/conversations/{}/messages", id_of(&conv)),
                Uuid::new_v4(),
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

mod test_edit_message {
    use super::*;

    #[tokio::test]
    async fn test_edit_keeps_previous_content() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let msg = app.send_message(owner, &id_of(&conv), "draft").await;

        let resp = app
            .send(authed_request(
                Method::PATCH,
                &format!("/v1/messages/{}", id_of(&msg)),
                owner,
                Some(json!({ "content": "final" })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = parse_body(resp).await;
        assert_eq!(body["content"], "final");
        assert_eq!(body["edit_history"][0]["content"], "draft");
        assert!(body["edit_history"][0]["edited_at"].is_string());
        assert!(body["edited_at"].is_string());
    }

    #[tokio::test]
    async fn test_edit_history_capped_at_ten() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let msg = app.send_message(owner, &id_of(&conv), "v0").await;
        let uri = format!("/v1/messages/{}", id_of(&msg));

        let mut last = json!(null);
        for i in 1..=11 {
            let resp = app
                .send(authed_request(
                    Method::PATCH,
                    &uri,
                    owner,
                    Some(json!({ "content": format!("v{}", i) })),
                ))
                .await;
            assert_eq!(resp.status(), StatusCode::OK);
            last = parse_body(resp).await;
        }

        let history = last["edit_history"].as_array().unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0]["content"], "v1");
        assert_eq!(history[9]["content"], "v10");
        assert_eq!(last["content"], "v11");
    }

    #[tokio::test]
    async fn test_edit_someone_elses_message_returns_404() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let msg = app.send_message(owner, &id_of(&conv), "mine").await;

        let resp = app
            .send(authed_request(
                Method::PATCH,
                &format!("/v1/messages/{}", id_of(&msg)),
                Uuid::new_v4(),
                Some(json!({ "content": "yours" })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_edit_deleted_message_returns_400() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let msg = app.send_message(owner, &id_of(&conv), "gone soon").await;
        let uri = format!("/v1/messages/{}", id_of(&msg));

        let resp = app
            .send(authed_request(Method::DELETE, &uri, owner, None))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .send(authed_request(
                Method::PATCH,
                &uri,
                owner,
                Some(json!({ "content": "back" })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

mod test_delete_message {
    use super::*;

    #[tokio::test]
    async fn test_soft_delete_leaves_placeholder() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let id = id_of(&conv);
        let msg = app.send_message(owner, &id, "regret").await;
        app.settle().await;

        let resp = app
            .send(authed_request(
                Method::DELETE,
                &format!("/v1/messages/{}", id_of(&msg)),
                owner,
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = parse_body(resp).await;
        assert_eq!(body["content"], "[Message deleted]");
        assert_eq!(body["status"], "deleted");
        assert_eq!(body["metadata"], json!({ "type": "deleted" }));
        assert!(body["deleted_at"].is_string());

        let messages = app.list_messages(owner, &id).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["content"], "[Message deleted]");
    }

    #[tokio::test]
    async fn test_soft_delete_twice_keeps_first_timestamp() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let msg = app.send_message(owner, &id_of(&conv), "bye").await;
        let uri = format!("/v1/messages/{}", id_of(&msg));

        let first = parse_body(
            app.send(authed_request(Method::DELETE, &uri, owner, None))
                .await,
        )
        .await;
        let second_resp = app
            .send(authed_request(Method::DELETE, &uri, owner, None))
            .await;
        assert_eq!(second_resp.status(), StatusCode::OK);
        let second = parse_body(second_resp).await;

        assert_eq!(first["deleted_at"], second["deleted_at"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_message_returns_404() {
        let app = TestApp::new();
        let resp = app
            .send(authed_request(
                Method::DELETE,
                &format!("/v1/messages/{}", Uuid::new_v4()),
                Uuid::new_v4(),
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
