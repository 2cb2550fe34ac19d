use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{delete, get, post, put, web, FromRequest, HttpRequest, HttpResponse};
use futures::future::{ready, Ready};
use log::{debug, info};
use serde::Deserialize;

use crate::auth::TokenStore;
use crate::error::{Error, Result};
use crate::models::{
    AuthResponse, CredentialsRequest, FollowRequest, PostContentRequest, UpdateRoleRequest,
};
use crate::pagination::PageParams;
use crate::service::{SearchScope, Services};

pub struct AppState {
    pub services: Services,
    pub tokens: TokenStore,
}

/// The caller resolved from the `Authorization` header.
///
/// Accepts both `Bearer <token>` and a bare token.
pub struct Authenticated {
    pub user_id: i64,
    pub token: String,
}

impl Authenticated {
    fn from_headers(req: &HttpRequest) -> Result<Self> {
        let state = req
            .app_data::<web::Data<AppState>>()
            .ok_or(Error::InvalidToken)?;
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::InvalidToken)?;
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();

        let user_id = state.tokens.validate(token)?;
        Ok(Self {
            user_id,
            token: token.to_string(),
        })
    }
}

impl FromRequest for Authenticated {
    type Error = Error;
    type Future = Ready<Result<Self>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::from_headers(req))
    }
}

/// Scope half of the hashtag search query; paging comes from [`PageParams`]
/// read off the same query string.
#[derive(Debug, Deserialize)]
pub struct HashtagParams {
    #[serde(rename = "type")]
    pub search_type: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountParams {
    pub with_posts: Option<bool>,
}

#[post("/auth/register")]
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse> {
    let user = state
        .services
        .users
        .register(&body.username, &body.password)
        .await?;
    Ok(HttpResponse::Created().json(user))
}

#[post("/auth/login")]
pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<CredentialsRequest>,
) -> Result<HttpResponse> {
    let user = state
        .services
        .users
        .authenticate(&body.username, &body.password)
        .await?;
    let token = state.tokens.issue(user.id);
    info!("User {} logged in", user.username);
    Ok(HttpResponse::Ok().json(AuthResponse { token, user }))
}

#[post("/auth/logout")]
pub async fn logout(state: web::Data<AppState>, auth: Authenticated) -> HttpResponse {
    state.tokens.revoke(&auth.token);
    debug!("User {} logged out", auth.user_id);
    HttpResponse::Ok().finish()
}

#[post("/posts")]
pub async fn create_post(
    state: web::Data<AppState>,
    auth: Authenticated,
    body: web::Json<PostContentRequest>,
) -> Result<HttpResponse> {
    let post = state.services.posts.create(auth.user_id, &body.content).await?;
    Ok(HttpResponse::Created().json(post))
}

#[get("/posts/my")]
pub async fn get_my_posts(
    state: web::Data<AppState>,
    auth: Authenticated,
    query: web::Query<PageParams>,
) -> Result<HttpResponse> {
    let posts = state
        .services
        .posts
        .get_my_posts(auth.user_id, query.pagination()?)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[get("/posts/feed")]
pub async fn get_feed(
    state: web::Data<AppState>,
    auth: Authenticated,
    query: web::Query<PageParams>,
) -> Result<HttpResponse> {
    let posts = state
        .services
        .posts
        .get_feed(auth.user_id, query.pagination()?, query.hashtag())
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[get("/posts/hashtag/{hashtag}")]
pub async fn get_posts_by_hashtag(
    state: web::Data<AppState>,
    _auth: Authenticated,
    hashtag: web::Path<String>,
    query: web::Query<HashtagParams>,
    paging: web::Query<PageParams>,
) -> Result<HttpResponse> {
    let scope = match query.search_type.as_deref() {
        None | Some("") => SearchScope::default(),
        Some(name) => name.parse()?,
    };

    let posts = state
        .services
        .posts
        .get_posts_by_hashtag(
            &hashtag,
            scope,
            query.username.as_deref(),
            paging.pagination()?,
        )
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[get("/posts/{id}")]
pub async fn get_post(
    state: web::Data<AppState>,
    _auth: Authenticated,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let post = state.services.posts.get_by_id(*post_id).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[put("/posts/{id}")]
pub async fn update_post(
    state: web::Data<AppState>,
    auth: Authenticated,
    post_id: web::Path<i64>,
    body: web::Json<PostContentRequest>,
) -> Result<HttpResponse> {
    let post = state
        .services
        .posts
        .update(*post_id, auth.user_id, &body.content)
        .await?;
    Ok(HttpResponse::Ok().json(post))
}

#[delete("/posts/{id}")]
pub async fn delete_post(
    state: web::Data<AppState>,
    auth: Authenticated,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    state.services.posts.delete(*post_id, auth.user_id).await?;
    Ok(HttpResponse::Ok().finish())
}

#[get("/users/{username}/posts")]
pub async fn get_user_posts(
    state: web::Data<AppState>,
    _auth: Authenticated,
    username: web::Path<String>,
    query: web::Query<PageParams>,
) -> Result<HttpResponse> {
    let user = state.services.users.get_by_username(&username).await?;
    let posts = state
        .services
        .posts
        .get_user_posts(user.id, query.pagination()?, query.hashtag())
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[post("/users/follow")]
pub async fn follow_user(
    state: web::Data<AppState>,
    auth: Authenticated,
    body: web::Json<FollowRequest>,
) -> Result<HttpResponse> {
    let target = state.services.users.get_by_username(&body.username).await?;
    state.services.follows.follow(auth.user_id, target.id).await?;
    Ok(HttpResponse::Ok().finish())
}

#[post("/users/unfollow")]
pub async fn unfollow_user(
    state: web::Data<AppState>,
    auth: Authenticated,
    body: web::Json<FollowRequest>,
) -> Result<HttpResponse> {
    let target = state.services.users.get_by_username(&body.username).await?;
    state
        .services
        .follows
        .unfollow(auth.user_id, target.id)
        .await?;
    Ok(HttpResponse::Ok().finish())
}

#[get("/users/followers")]
pub async fn get_followers(
    state: web::Data<AppState>,
    auth: Authenticated,
    query: web::Query<PageParams>,
) -> Result<HttpResponse> {
    let users = state
        .services
        .follows
        .get_followers(auth.user_id, query.pagination()?)
        .await?;
    Ok(HttpResponse::Ok().json(users))
}

#[get("/users/following")]
pub async fn get_following(
    state: web::Data<AppState>,
    auth: Authenticated,
    query: web::Query<PageParams>,
) -> Result<HttpResponse> {
    let users = state
        .services
        .follows
        .get_following(auth.user_id, query.pagination()?)
        .await?;
    Ok(HttpResponse::Ok().json(users))
}

#[get("/users/mutual")]
pub async fn get_mutual_follows(
    state: web::Data<AppState>,
    auth: Authenticated,
    query: web::Query<PageParams>,
) -> Result<HttpResponse> {
    let users = state
        .services
        .follows
        .get_mutual_follows(auth.user_id, query.pagination()?)
        .await?;
    Ok(HttpResponse::Ok().json(users))
}

#[put("/users/role")]
pub async fn update_user_role(
    state: web::Data<AppState>,
    auth: Authenticated,
    body: web::Json<UpdateRoleRequest>,
) -> Result<HttpResponse> {
    state
        .services
        .users
        .change_role(auth.user_id, body.user_id, &body.new_role)
        .await?;
    Ok(HttpResponse::Ok().finish())
}

#[delete("/users/{username}")]
pub async fn delete_account(
    state: web::Data<AppState>,
    auth: Authenticated,
    username: web::Path<String>,
    query: web::Query<DeleteAccountParams>,
) -> Result<HttpResponse> {
    let target = state.services.users.get_by_username(&username).await?;
    state
        .services
        .users
        .delete_account(auth.user_id, target.id, query.with_posts.unwrap_or(false))
        .await?;

    state.tokens.revoke_user(target.id);
    Ok(HttpResponse::Ok().finish())
}

/// Registers every route. Static segments go before `{param}` routes that
/// could shadow them.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(logout)
        .service(
            web::scope("/api")
                .service(create_post)
                .service(get_my_posts)
                .service(get_feed)
                .service(get_posts_by_hashtag)
                .service(get_post)
                .service(update_post)
                .service(delete_post)
                .service(follow_user)
                .service(unfollow_user)
                .service(get_followers)
                .service(get_following)
                .service(get_mutual_follows)
                .service(update_user_role)
                .service(get_user_posts)
                .service(delete_account),
        );
}
