//! The storage collaborator: every durable read and write goes through
//! [`Store`]. Backends report missing rows and duplicate keys as distinct
//! [`StoreError`] variants so the services can map them to typed outcomes.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{NewPost, NewUser, Post, Role, User};
use crate::pagination::Pagination;

pub mod memory;
pub mod scylla;

pub use self::memory::MemoryStore;
pub use self::scylla::ScyllaStore;

/// Whose posts a [`PostQuery`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    /// Posts written by this user.
    Author(i64),
    /// Posts written by anyone this user follows.
    FollowedBy(i64),
    All,
}

#[derive(Debug, Clone)]
pub struct PostQuery {
    pub scope: PostScope,
    /// Exact-match hashtag filter.
    pub hashtag: Option<String>,
    pub page: Pagination,
}

impl PostQuery {
    pub fn new(scope: PostScope, page: Pagination) -> Self {
        Self {
            scope,
            hashtag: None,
            page,
        }
    }

    pub fn with_hashtag(mut self, hashtag: Option<&str>) -> Self {
        self.hashtag = hashtag.map(str::to_string);
        self
    }

    pub fn matches_hashtag(&self, post: &Post) -> bool {
        self.hashtag
            .as_ref()
            .map_or(true, |tag| post.hashtags.contains(tag))
    }

    /// Orders candidate rows by creation time (ties by id) and cuts the page.
    pub fn paginate(&self, mut posts: Vec<Post>) -> Vec<Post> {
        posts.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if self.page.desc() {
            posts.reverse();
        }
        self.page.slice(posts)
    }
}

/// Which side of the follow graph [`Store::find_users`] walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowRelation {
    /// Users following the subject.
    Followers,
    /// Users the subject follows.
    Following,
    /// Users in both sets.
    Mutual,
}

/// Orders users by username and cuts the page.
pub(crate) fn paginate_users(mut users: Vec<User>, page: Pagination) -> Vec<User> {
    users.sort_by(|a, b| a.username.cmp(&b.username));
    page.slice(users)
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with `Duplicate` when the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn user_by_id(&self, id: i64) -> Result<User, StoreError>;
    async fn user_by_username(&self, username: &str) -> Result<User, StoreError>;
    async fn update_role(&self, id: i64, role: Role) -> Result<(), StoreError>;
    /// Removes the user and its follow edges, and its posts when asked to.
    async fn delete_user(&self, id: i64, with_posts: bool) -> Result<(), StoreError>;

    /// Writes the post row and its hashtag set as one unit.
    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError>;
    async fn post_by_id(&self, id: i64) -> Result<Post, StoreError>;
    /// Replaces content and the whole hashtag set as one unit.
    async fn update_post(
        &self,
        id: i64,
        content: &str,
        hashtags: &HashSet<String>,
    ) -> Result<Post, StoreError>;
    async fn delete_post(&self, id: i64) -> Result<(), StoreError>;
    async fn find_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError>;

    /// Fails with `Duplicate` when the edge already exists.
    async fn insert_follow(&self, follower_id: i64, following_id: i64) -> Result<(), StoreError>;
    /// Fails with `NotFound` when there was no edge.
    async fn delete_follow(&self, follower_id: i64, following_id: i64) -> Result<(), StoreError>;
    async fn find_users(
        &self,
        relation: FollowRelation,
        user_id: i64,
        page: Pagination,
    ) -> Result<Vec<User>, StoreError>;
}
