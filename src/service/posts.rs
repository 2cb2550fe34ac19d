use std::str::FromStr;
use std::sync::Arc;

use log::{debug, info};

use crate::auth::policy;
use crate::error::{Entity, Error, Result};
use crate::hashtags;
use crate::models::{validate_content, NewPost, Post, User};
use crate::pagination::Pagination;
use crate::store::{PostQuery, PostScope, Store};

/// Which authors a hashtag search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Posts by one named user.
    User,
    /// Posts by the users a named user follows.
    Following,
    #[default]
    All,
}

impl SearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::User => "user",
            SearchScope::Following => "following",
            SearchScope::All => "all",
        }
    }
}

impl FromStr for SearchScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(SearchScope::User),
            "following" => Ok(SearchScope::Following),
            "all" => Ok(SearchScope::All),
            other => Err(Error::UnknownScope(other.to_string())),
        }
    }
}

pub struct PostService {
    store: Arc<dyn Store>,
}

impl PostService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, post_id: i64) -> Result<Post> {
        self.store
            .post_by_id(post_id)
            .await
            .map_err(Error::lookup("get post", Entity::Post))
    }

    pub async fn get_user_posts(
        &self,
        user_id: i64,
        page: Pagination,
        hashtag: Option<&str>,
    ) -> Result<Vec<Post>> {
        let query = PostQuery::new(PostScope::Author(user_id), page).with_hashtag(hashtag);
        self.find(query, "query user posts").await
    }

    pub async fn get_my_posts(&self, user_id: i64, page: Pagination) -> Result<Vec<Post>> {
        self.get_user_posts(user_id, page, None).await
    }

    pub async fn get_feed(
        &self,
        user_id: i64,
        page: Pagination,
        hashtag: Option<&str>,
    ) -> Result<Vec<Post>> {
        let query = PostQuery::new(PostScope::FollowedBy(user_id), page).with_hashtag(hashtag);
        self.find(query, "query feed").await
    }

    /// Hashtag search. `user` and `following` scopes are resolved against
    /// `scope_username`, which they require.
    pub async fn get_posts_by_hashtag(
        &self,
        hashtag: &str,
        scope: SearchScope,
        scope_username: Option<&str>,
        page: Pagination,
    ) -> Result<Vec<Post>> {
        debug!("Hashtag search #{} in {} scope", hashtag, scope.as_str());
        let post_scope = match scope {
            SearchScope::All => PostScope::All,
            SearchScope::User => PostScope::Author(self.scope_user(scope_username).await?.id),
            SearchScope::Following => {
                PostScope::FollowedBy(self.scope_user(scope_username).await?.id)
            }
        };
        let query = PostQuery::new(post_scope, page).with_hashtag(Some(hashtag));
        self.find(query, "query hashtag posts").await
    }

    pub async fn create(&self, user_id: i64, content: &str) -> Result<Post> {
        validate_content(content)?;
        let post = self
            .store
            .create_post(NewPost {
                author_id: user_id,
                content: content.to_string(),
                hashtags: hashtags::extract(content),
            })
            .await
            .map_err(Error::lookup("create post", Entity::User))?;

        info!("User {} created post {}", user_id, post.id);
        Ok(post)
    }

    /// Rewrites the content and replaces the whole hashtag set.
    pub async fn update(&self, post_id: i64, actor_id: i64, content: &str) -> Result<Post> {
        validate_content(content)?;
        let post = self.get_by_id(post_id).await?;
        let actor = self.actor(actor_id).await?;
        if !policy::can_modify_post(&actor, &post) {
            return Err(Error::Forbidden);
        }

        let tags = hashtags::extract(content);
        let post = self
            .store
            .update_post(post_id, content, &tags)
            .await
            .map_err(Error::lookup("update post", Entity::Post))?;

        debug!("User {} updated post {}", actor_id, post_id);
        Ok(post)
    }

    pub async fn delete(&self, post_id: i64, actor_id: i64) -> Result<()> {
        let post = self.get_by_id(post_id).await?;
        let actor = self.actor(actor_id).await?;
        if !policy::can_delete_post(&actor, &post) {
            return Err(Error::Forbidden);
        }

        self.store
            .delete_post(post_id)
            .await
            .map_err(Error::lookup("delete post", Entity::Post))?;

        info!("User {} deleted post {}", actor_id, post_id);
        Ok(())
    }

    async fn find(&self, query: PostQuery, op: &'static str) -> Result<Vec<Post>> {
        self.store.find_posts(&query).await.map_err(Error::storage(op))
    }

    async fn actor(&self, actor_id: i64) -> Result<User> {
        self.store
            .user_by_id(actor_id)
            .await
            .map_err(Error::lookup("get user", Entity::User))
    }

    async fn scope_user(&self, username: Option<&str>) -> Result<User> {
        let username = username
            .filter(|name| !name.is_empty())
            .ok_or(Error::MissingScopeUsername)?;
        self.store
            .user_by_username(username)
            .await
            .map_err(Error::lookup("get user by username", Entity::User))
    }
}
