//! Conversation handler integration tests

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use crate::common::{anonymous_request, authed_request, id_of, parse_body, TestApp};

mod test_create_conversation {
    use super::*;

    #[tokio::test]
    async fn test_create_conversation_returns_201_with_default_title() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();

        let body = app.create_conversation(owner, None).await;

        assert_eq!(body["title"], "New Chat");
        assert_eq!(body["user_id"], owner.to_string());
        assert_eq!(body["created_at"], body["updated_at"]);
    }

    #[tokio::test]
    async fn test_create_conversation_with_title() {
        let app = TestApp::new();
        let body = app
            .create_conversation(Uuid::new_v4(), Some("Trip planning"))
            .await;
        assert_eq!(body["title"], "Trip planning");
    }

    #[tokio::test]
    async fn test_create_blank_title_falls_back_to_default() {
        let app = TestApp::new();
        let body = app.create_conversation(Uuid::new_v4(), Some("   ")).await;
        assert_eq!(body["title"], "New Chat");
    }

    #[tokio::test]
    async fn test_create_overlong_title_returns_400() {
        let app = TestApp::new();
        let req = authed_request(
            Method::POST,
            "/v1/conversations",
            Uuid::new_v4(),
            Some(json!({ "title": "x".repeat(201) })),
        );

        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = parse_body(resp).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_padded_title_at_limit_is_trimmed() {
        let app = TestApp::new();
        let title = "x".repeat(200);
        let req = authed_request(
            Method::POST,
            "/v1/conversations",
            Uuid::new_v4(),
            Some(json!({ "title": format!("  {}  ", title) })),
        );

        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = parse_body(resp).await;
        assert_eq!(body["title"], title);
    }

    #[tokio::test]
    async fn test_create_without_owner_returns_401() {
        let app = TestApp::new();
        let req = anonymous_request(Method::POST, "/v1/conversations", Some(json!({})));

        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body = parse_body(resp).await;
        assert_eq!(body["error"]["code"], "AUTHENTICATION_ERROR");
    }

    #[tokio::test]
    async fn test_create_with_malformed_owner_returns_401() {
        let app = TestApp::new();
        let req = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/v1/conversations")
            .header(chatline_common::OWNER_HEADER, "not-a-uuid")
            .body(axum::body::Body::empty())
            .unwrap();

        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}

mod test_list_conversations {
    use super::*;

    #[tokio::test]
    async fn test_list_returns_only_own_conversations() {
        let app = TestApp::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        app.create_conversation(alice, Some("a1")).await;
        app.create_conversation(alice, Some("a2")).await;
        app.create_conversation(bob, Some("b1")).await;

        let resp = app
            .send(authed_request(Method::GET, "/v1/conversations", alice, None))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = parse_body(resp).await;
        let titles: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(!titles.contains(&"b1"));
    }

    #[tokio::test]
    async fn test_list_empty_for_new_owner() {
        let app = TestApp::new();
        let resp = app
            .send(authed_request(
                Method::GET,
                "/v1/conversations",
                Uuid::new_v4(),
                None,
            ))
            .await;
        let body = parse_body(resp).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_message_moves_conversation_to_front() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let older = app.create_conversation(owner, Some("older")).await;
        app.create_conversation(owner, Some("newer")).await;

        app.send_message(owner, &id_of(&older), "bump").await;
        app.settle().await;

        let resp = app
            .send(authed_request(Method::GET, "/v1/conversations", owner, None))
            .await;
        let body = parse_body(resp).await;
        assert_eq!(body[0]["title"], "older");
    }
}

mod test_get_conversation {
    use super::*;

    #[tokio::test]
    async fn test_get_own_conversation() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let created = app.create_conversation(owner, Some("mine")).await;

        let resp = app
            .send(authed_request(
                Method::GET,
                &format!("/v1/conversations/{}", id_of(&created)),
                owner,
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(parse_body(resp).await, created);
    }

    #[tokio::test]
    async fn test_get_other_owners_conversation_returns_404() {
        let app = TestApp::new();
        let created = app.create_conversation(Uuid::new_v4(), None).await;

        let resp = app
            .send(authed_request(
                Method::GET,
                &format!("/v1/conversations/{}", id_of(&created)),
                Uuid::new_v4(),
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = parse_body(resp).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_get_malformed_id_returns_400() {
        let app = TestApp::new();
        let resp = app
            .send(authed_request(
                Method::GET,
                "/v1/conversations/not-a-uuid",
                Uuid::new_v4(),
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

mod test_rename_conversation {
    use super::*;

    #[tokio::test]
    async fn test_rename_trims_and_saves_title() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let created = app.create_conversation(owner, None).await;

        let resp = app
            .send(authed_request(
                Method::PATCH,
                &format!("/v1/conversations/{}", id_of(&created)),
                owner,
                Some(json!({ "title": "  Renamed  " })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = parse_body(resp).await;
        assert_eq!(body["title"], "Renamed");
    }

    #[tokio::test]
    async fn test_rename_whitespace_title_returns_400() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let created = app.create_conversation(owner, None).await;

        let resp = app
            .send(authed_request(
                Method::PATCH,
                &format!("/v1/conversations/{}", id_of(&created)),
                owner,
                Some(json!({ "title": "   " })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rename_missing_title_returns_400() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let created = app.create_conversation(owner, None).await;

        let resp = app
            .send(authed_request(
                Method::PATCH,
                &format!("/v1/conversations/{}", id_of(&created)),
                owner,
                Some(json!({})),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rename_other_owners_conversation_returns_404() {
        let app = TestApp::new();
        let created = app.create_conversation(Uuid::new_v4(), None).await;

        let resp = app
            .send(authed_request(
                Method::PATCH,
                &format!("/v1/conversations/{}", id_of(&created)),
                Uuid::new_v4(),
                Some(json!({ "title": "hijack" })),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

mod test_delete_conversation {
    use super::*;

    #[tokio::test]
    async fn test_delete_returns_204_and_removes_messages() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let id = id_of(&conv);
        app.send_message(owner, &id, "Hello").await;
        app.settle().await;

        let resp = app
            .send(authed_request(
                Method::DELETE,
                &format!("/v1/conversations/{}", id),
                owner,
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(app.store.message_count().unwrap(), 0);

        let resp = app
            .send(authed_request(
                Method::GET,
                &format!("/v1/conversations/{}/messages", id),
                owner,
                None,
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_twice_returns_404() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let uri = format!("/v1/conversations/{}", id_of(&conv));

        let first = app
            .send(authed_request(Method::DELETE, &uri, owner, None))
            .await;
        assert_eq!(first.status(), StatusCode::NO_CONTENT);

        let second = app
            .send(authed_request(Method::DELETE, &uri, owner, None))
            .await;
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_persistent_store_failure_returns_500() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let conv = app.create_conversation(owner, None).await;
        let uri = format!("/v1/conversations/{}", id_of(&conv));

        app.store.fail_next_message_deletes(10);
        let resp = app
            .send(authed_request(Method::DELETE, &uri, owner, None))
            .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        app.store.fail_next_message_deletes(0);
        let resp = app.send(authed_request(Method::GET, &uri, owner, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_clear_all_deletes_every_owned_conversation() {
        let app = TestApp::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = app.create_conversation(owner, None).await;
        app.create_conversation(owner, None).await;
        app.create_conversation(other, None).await;
        app.send_message(owner, &id_of(&a), "hi").await;
        app.settle().await;

        let resp = app
            .send(authed_request(Method::DELETE, "/v1/conversations", owner, None))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(parse_body(resp).await, json!({ "deleted": 2 }));

        let mine = app
            .send(authed_request(Method::GET, "/v1/conversations", owner, None))
            .await;
        assert_eq!(parse_body(mine).await, json!([]));

        let theirs = app
            .send(authed_request(Method::GET, "/v1/conversations", other, None))
            .await;
        assert_eq!(parse_body(theirs).await.as_array().unwrap().len(), 1);
        assert_eq!(app.store.message_count().unwrap(), 0);
    }
}
