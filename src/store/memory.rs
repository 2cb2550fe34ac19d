use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{paginate_users, FollowRelation, PostQuery, PostScope, Store};
use crate::error::StoreError;
use crate::models::{NewPost, NewUser, Post, Role, User};
use crate::pagination::Pagination;

#[derive(Default)]
struct Tables {
    next_user_id: i64,
    next_post_id: i64,
    users: HashMap<i64, User>,
    posts: HashMap<i64, Post>,
    /// (follower_id, following_id)
    follows: BTreeSet<(i64, i64)>,
}

impl Tables {
    fn with_author(&self, post: &Post) -> Post {
        let mut post = post.clone();
        post.author = self.users.get(&post.author_id).map(|u| u.username.clone());
        post
    }

    fn following_of(&self, user_id: i64) -> HashSet<i64> {
        self.follows
            .range((user_id, i64::MIN)..=(user_id, i64::MAX))
            .map(|&(_, following)| following)
            .collect()
    }

    fn followers_of(&self, user_id: i64) -> HashSet<i64> {
        self.follows
            .iter()
            .filter(|&&(_, following)| following == user_id)
            .map(|&(follower, _)| follower)
            .collect()
    }
}

/// Process-local [`Store`]. Each call runs under one guard of the table lock,
/// so multi-row writes are all-or-nothing.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate);
        }

        tables.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: tables.next_user_id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        tables.users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let tables = self.tables.read().await;
        tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.role = role;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_user(&self, id: i64, with_posts: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.users.remove(&id).ok_or(StoreError::NotFound)?;
        tables
            .follows
            .retain(|&(follower, following)| follower != id && following != id);
        if with_posts {
            tables.posts.retain(|_, post| post.author_id != id);
        }
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&post.author_id) {
            return Err(StoreError::NotFound);
        }

        tables.next_post_id += 1;
        let now = Utc::now();
        let post = Post {
            id: tables.next_post_id,
            author_id: post.author_id,
            author: None,
            content: post.content,
            hashtags: post.hashtags,
            created_at: now,
            updated_at: now,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(tables.with_author(&post))
    }

    async fn post_by_id(&self, id: i64) -> Result<Post, StoreError> {
        let tables = self.tables.read().await;
        let post = tables.posts.get(&id).ok_or(StoreError::NotFound)?;
        Ok(tables.with_author(post))
    }

    async fn update_post(
        &self,
        id: i64,
        content: &str,
        hashtags: &HashSet<String>,
    ) -> Result<Post, StoreError> {
        let mut tables = self.tables.write().await;
        let post = tables.posts.get_mut(&id).ok_or(StoreError::NotFound)?;
        post.content = content.to_string();
        post.hashtags = hashtags.clone();
        post.updated_at = Utc::now();
        let post = post.clone();
        Ok(tables.with_author(&post))
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .posts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn find_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError> {
        let tables = self.tables.read().await;
        let authors = match query.scope {
            PostScope::Author(id) => Some(HashSet::from([id])),
            PostScope::FollowedBy(id) => Some(tables.following_of(id)),
            PostScope::All => None,
        };

        let candidates = tables
            .posts
            .values()
            .filter(|post| {
                authors
                    .as_ref()
                    .map_or(true, |authors| authors.contains(&post.author_id))
            })
            .filter(|post| query.matches_hashtag(post))
            .map(|post| tables.with_author(post))
            .collect();
        Ok(query.paginate(candidates))
    }

    async fn insert_follow(&self, follower_id: i64, following_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&follower_id) || !tables.users.contains_key(&following_id) {
            return Err(StoreError::NotFound);
        }
        if !tables.follows.insert((follower_id, following_id)) {
            return Err(StoreError::Duplicate);
        }
        Ok(())
    }

    async fn delete_follow(&self, follower_id: i64, following_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.follows.remove(&(follower_id, following_id)) {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_users(
        &self,
        relation: FollowRelation,
        user_id: i64,
        page: Pagination,
    ) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        let ids = match relation {
            FollowRelation::Followers => tables.followers_of(user_id),
            FollowRelation::Following => tables.following_of(user_id),
            FollowRelation::Mutual => {
                let following = tables.following_of(user_id);
                tables
                    .followers_of(user_id)
                    .intersection(&following)
                    .copied()
                    .collect()
            }
        };

        let users = ids
            .iter()
            .filter_map(|id| tables.users.get(id).cloned())
            .collect();
        Ok(paginate_users(users, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        }
    }

    fn new_post(author_id: i64, content: &str) -> NewPost {
        NewPost {
            author_id,
            content: content.to_string(),
            hashtags: crate::hashtags::extract(content),
        }
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let store = MemoryStore::new();
        store.create_user(new_user("alice")).await.unwrap();
        assert!(matches!(
            store.create_user(new_user("alice")).await,
            Err(StoreError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn posts_need_an_existing_author() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_post(new_post(1, "orphan")).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn posts_carry_their_author_name() {
        let store = MemoryStore::new();
        let alice = store.create_user(new_user("alice")).await.unwrap();
        let post = store.create_post(new_post(alice.id, "#hi")).await.unwrap();
        let fetched = store.post_by_id(post.id).await.unwrap();
        assert_eq!(fetched.author.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn follow_edges_are_unique() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a")).await.unwrap();
        let b = store.create_user(new_user("b")).await.unwrap();

        store.insert_follow(a.id, b.id).await.unwrap();
        assert!(matches!(
            store.insert_follow(a.id, b.id).await,
            Err(StoreError::Duplicate)
        ));
        store.delete_follow(a.id, b.id).await.unwrap();
        assert!(matches!(
            store.delete_follow(a.id, b.id).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleting_a_user_drops_edges_and_optionally_posts() {
        let store = MemoryStore::new();
        let a = store.create_user(new_user("a")).await.unwrap();
        let b = store.create_user(new_user("b")).await.unwrap();
        store.insert_follow(b.id, a.id).await.unwrap();
        let post = store.create_post(new_post(a.id, "bye")).await.unwrap();

        store.delete_user(a.id, true).await.unwrap();

        let page = Pagination::default();
        assert!(store
            .find_users(FollowRelation::Following, b.id, page)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.post_by_id(post.id).await,
            Err(StoreError::NotFound)
        ));
    }
}
