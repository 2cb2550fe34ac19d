use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chirp::auth::TokenStore;
use chirp::handlers::{self, AppState};
use chirp::models::Role;
use chirp::service::Services;
use chirp::store::{MemoryStore, Store};
use serde_json::{json, Value};

fn state() -> web::Data<AppState> {
    web::Data::new(AppState {
        services: Services::new(Arc::new(MemoryStore::new()), 4),
        tokens: TokenStore::default(),
    })
}

/// Registers a user directly and hands back a live token for them.
async fn signup(state: &web::Data<AppState>, username: &str) -> String {
    let user = state
        .services
        .users
        .register(username, "secret1")
        .await
        .unwrap();
    state.tokens.issue(user.id)
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

#[actix_web::test]
async fn test_full_post_flow() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;
    let creds = json!({ "username": "alice", "password": "secret1" });

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(&creds)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let user: Value = test::read_body_json(resp).await;
    assert_eq!(user["role"], "user");
    assert!(user.get("password_hash").is_none());

    let req = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(&creds)
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::CONFLICT
    );

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "username": "alice", "password": "wrong-password" }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(&creds)
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 64);

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(&token))
        .set_json(json!({ "content": "My day #fun #FUN" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let post: Value = test::read_body_json(resp).await;
    let mut tags: Vec<&str> = post["hashtags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap())
        .collect();
    tags.sort_unstable();
    assert_eq!(tags, ["FUN", "fun"]);
    assert_eq!(post["author"], "alice");
    let post_id = post["id"].as_i64().unwrap();

    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{}", post_id))
        .insert_header(bearer(&token))
        .set_json(json!({ "content": "#newtag only" }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["hashtags"], json!(["newtag"]));

    let req = test::TestRequest::get()
        .uri("/api/posts/my?page=1&per_page=5&desc=false")
        .insert_header(bearer(&token))
        .to_request();
    let mine: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let req = test::TestRequest::delete()
        .uri(&format!("/api/posts/{}", post_id))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/posts/{}", post_id))
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn test_requests_without_valid_token_are_unauthorized() {
    let app = test::init_service(App::new().app_data(state()).configure(handlers::configure)).await;

    let req = test::TestRequest::get().uri("/api/posts/feed").to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let req = test::TestRequest::get()
        .uri("/api/posts/feed")
        .insert_header(bearer("deadbeef"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "invalid or expired token");
}

#[actix_web::test]
async fn test_logout_revokes_the_token() {
    let state = state();
    let token = signup(&state, "alice").await;
    let app = test::init_service(App::new().app_data(state).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(bearer(&token))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/posts/my")
        .insert_header(("Authorization", token))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_follow_feed_and_status_codes() {
    let state = state();
    let alice = signup(&state, "alice").await;
    let bob = signup(&state, "bob").await;
    let app = test::init_service(App::new().app_data(state).configure(handlers::configure)).await;

    let follow = |token: &str, username: &str| {
        test::TestRequest::post()
            .uri("/api/users/follow")
            .insert_header(bearer(token))
            .set_json(json!({ "username": username }))
            .to_request()
    };

    assert_eq!(
        test::call_service(&app, follow(&alice, "alice")).await.status(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        test::call_service(&app, follow(&alice, "bob")).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        test::call_service(&app, follow(&alice, "bob")).await.status(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        test::call_service(&app, follow(&alice, "nobody")).await.status(),
        StatusCode::NOT_FOUND
    );

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(&bob))
        .set_json(json!({ "content": "hello from bob #intro" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/api/posts/feed?hashtag=intro")
        .insert_header(bearer(&alice))
        .to_request();
    let feed: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(feed.as_array().unwrap().len(), 1);
    assert_eq!(feed[0]["author"], "bob");

    let req = test::TestRequest::get()
        .uri("/api/posts/hashtag/intro?type=following&username=alice")
        .insert_header(bearer(&alice))
        .to_request();
    let found: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(found.as_array().unwrap().len(), 1);

    let req = test::TestRequest::get()
        .uri("/api/users/followers")
        .insert_header(bearer(&bob))
        .to_request();
    let followers: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(followers[0]["username"], "alice");
    assert!(followers[0].get("password_hash").is_none());

    let req = test::TestRequest::get()
        .uri("/api/posts/feed?page=0")
        .insert_header(bearer(&alice))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let unfollow = |token: &str| {
        test::TestRequest::post()
            .uri("/api/users/unfollow")
            .insert_header(bearer(token))
            .set_json(json!({ "username": "bob" }))
            .to_request()
    };
    assert_eq!(
        test::call_service(&app, unfollow(&alice)).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        test::call_service(&app, unfollow(&alice)).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[actix_web::test]
async fn test_moderation_requires_roles() {
    let state = state();
    let alice = signup(&state, "alice").await;
    let bob = signup(&state, "bob").await;
    let app = test::init_service(App::new().app_data(state).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/posts")
        .insert_header(bearer(&alice))
        .set_json(json!({ "content": "alice's post" }))
        .to_request();
    let post: Value = test::call_and_read_body_json(&app, req).await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/posts/{}", post["id"]))
        .insert_header(bearer(&bob))
        .set_json(json!({ "content": "defaced" }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::FORBIDDEN
    );

    let req = test::TestRequest::put()
        .uri("/api/users/role")
        .insert_header(bearer(&bob))
        .set_json(json!({ "user_id": post["author_id"], "new_role": "admin" }))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::FORBIDDEN
    );

    let req = test::TestRequest::delete()
        .uri("/api/users/alice")
        .insert_header(bearer(&bob))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::FORBIDDEN
    );

    let req = test::TestRequest::delete()
        .uri("/api/users/bob?with_posts=true")
        .insert_header(bearer(&bob))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/api/posts/my")
        .insert_header(bearer(&bob))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_staff_deleting_an_account_ends_its_sessions() {
    let store = Arc::new(MemoryStore::new());
    let state = web::Data::new(AppState {
        services: Services::new(store.clone(), 4),
        tokens: TokenStore::default(),
    });
    let alice = signup(&state, "alice").await;
    let moderator = signup(&state, "mod").await;
    let moderator_id = state.tokens.validate(&moderator).unwrap();
    store.update_role(moderator_id, Role::Moderator).await.unwrap();
    let app = test::init_service(App::new().app_data(state.clone()).configure(handlers::configure)).await;

    let req = test::TestRequest::delete()
        .uri("/api/users/alice")
        .insert_header(bearer(&moderator))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    assert!(state.tokens.validate(&alice).is_err());
    assert!(state.tokens.validate(&moderator).is_ok());

    let req = test::TestRequest::get()
        .uri("/api/users/followers")
        .insert_header(bearer(&alice))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::UNAUTHORIZED
    );
}

#[actix_web::test]
async fn test_hashtag_search_uses_standard_paging() {
    let state = state();
    let alice = signup(&state, "alice").await;
    let app = test::init_service(App::new().app_data(state).configure(handlers::configure)).await;

    for content in ["first #rust", "second #rust", "third #Rust"] {
        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(bearer(&alice))
            .set_json(json!({ "content": content }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri("/api/posts/hashtag/rust")
        .insert_header(bearer(&alice))
        .to_request();
    let all: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["content"], "second #rust");

    let req = test::TestRequest::get()
        .uri("/api/posts/hashtag/rust?type=user&username=alice&page=2&per_page=1&desc=true")
        .insert_header(bearer(&alice))
        .to_request();
    let second: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(second.as_array().unwrap().len(), 1);
    assert_eq!(second[0]["content"], "first #rust");

    let req = test::TestRequest::get()
        .uri("/api/posts/hashtag/rust?per_page=0")
        .insert_header(bearer(&alice))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );

    let req = test::TestRequest::get()
        .uri("/api/posts/hashtag/rust?type=user")
        .insert_header(bearer(&alice))
        .to_request();
    assert_eq!(
        test::call_service(&app, req).await.status(),
        StatusCode::BAD_REQUEST
    );
}
