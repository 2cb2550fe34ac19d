//! [`Store`] over a Scylla/Cassandra cluster.
//!
//! A post and its hashtag set live in one row (`hashtags set<text>`), so
//! creating or editing a post is a single-row write and cannot half-apply.
//! Uniqueness is enforced with lightweight transactions (`IF NOT EXISTS`).
//! Ordering and pagination happen client-side after the candidate rows are
//! fetched.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use ::scylla::frame::response::result::{CqlValue, Row};
use ::scylla::frame::value::CqlTimestamp;
use ::scylla::transport::errors::QueryError;
use ::scylla::{QueryResult, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{debug, warn};

use super::{paginate_users, FollowRelation, PostQuery, PostScope, Store};
use crate::error::StoreError;
use crate::models::{NewPost, NewUser, Post, Role, User};
use crate::pagination::Pagination;

const USER_COLUMNS: &str = "id, username, password_hash, role, created_at, updated_at";
const POST_COLUMNS: &str = "id, author_id, content, hashtags, created_at, updated_at";

impl From<QueryError> for StoreError {
    fn from(err: QueryError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub struct ScyllaStore {
    session: Arc<Session>,
}

impl ScyllaStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn posts_by_author(&self, author_id: i64) -> Result<Vec<Post>, StoreError> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM posts WHERE author_id = ?", POST_COLUMNS),
                (author_id,),
            )
            .await?;
        Ok(posts(result))
    }

    async fn following_ids(&self, user_id: i64) -> Result<HashSet<i64>, StoreError> {
        let result = self
            .session
            .query(
                "SELECT following_id FROM follows WHERE follower_id = ?",
                (user_id,),
            )
            .await?;
        Ok(rows(result)
            .iter()
            .filter_map(|row| bigint(row.columns.first()?))
            .collect())
    }

    async fn follower_ids(&self, user_id: i64) -> Result<HashSet<i64>, StoreError> {
        let result = self
            .session
            .query(
                "SELECT follower_id FROM follows WHERE following_id = ? ALLOW FILTERING",
                (user_id,),
            )
            .await?;
        Ok(rows(result)
            .iter()
            .filter_map(|row| bigint(row.columns.first()?))
            .collect())
    }

    /// Loads users by id, skipping ids whose row has since disappeared.
    async fn users_by_ids(&self, ids: impl IntoIterator<Item = i64>) -> Result<Vec<User>, StoreError> {
        let lookups = ids.into_iter().map(|id| async move {
            match self.user_by_id(id).await {
                Ok(user) => Ok(Some(user)),
                Err(StoreError::NotFound) => Ok(None),
                Err(e) => Err(e),
            }
        });
        Ok(try_join_all(lookups).await?.into_iter().flatten().collect())
    }

    async fn fill_authors(&self, mut posts: Vec<Post>) -> Result<Vec<Post>, StoreError> {
        let author_ids: HashSet<i64> = posts.iter().map(|p| p.author_id).collect();
        let names: HashMap<i64, String> = self
            .users_by_ids(author_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();
        for post in &mut posts {
            post.author = names.get(&post.author_id).cloned();
        }
        Ok(posts)
    }
}

#[async_trait]
impl Store for ScyllaStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();
        let ts = CqlTimestamp(now.timestamp_millis());
        let mut id = next_id();
        for attempt in 1.. {
            let insert = self
                .session
                .query(
                    format!(
                        "INSERT INTO users ({}) VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                        USER_COLUMNS
                    ),
                    (id, &user.username, &user.password_hash, user.role.as_str(), ts, ts),
                )
                .await?;
            if applied(&insert) {
                break;
            }
            id = next_id_after(id, attempt)?;
        }

        let claim = self
            .session
            .query(
                "INSERT INTO users_by_username (username, id) VALUES (?, ?) IF NOT EXISTS",
                (&user.username, id),
            )
            .await;
        match claim {
            Ok(result) if applied(&result) => {}
            outcome => {
                debug!("Dropping user row {} after failed username claim", id);
                self.session
                    .query("DELETE FROM users WHERE id = ?", (id,))
                    .await?;
                return match outcome {
                    Ok(_) => Err(StoreError::Duplicate),
                    Err(e) => Err(e.into()),
                };
            }
        }

        Ok(User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        })
    }

    async fn user_by_id(&self, id: i64) -> Result<User, StoreError> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                (id,),
            )
            .await?;
        rows(result)
            .first()
            .and_then(parse_user)
            .ok_or(StoreError::NotFound)
    }

    async fn user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let result = self
            .session
            .query(
                "SELECT id FROM users_by_username WHERE username = ?",
                (username,),
            )
            .await?;
        let id = rows(result)
            .first()
            .and_then(|row| bigint(row.columns.first()?))
            .ok_or(StoreError::NotFound)?;
        self.user_by_id(id).await
    }

    async fn update_role(&self, id: i64, role: Role) -> Result<(), StoreError> {
        let ts = CqlTimestamp(Utc::now().timestamp_millis());
        let result = self
            .session
            .query(
                "UPDATE users SET role = ?, updated_at = ? WHERE id = ? IF EXISTS",
                (role.as_str(), ts, id),
            )
            .await?;
        if !applied(&result) {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64, with_posts: bool) -> Result<(), StoreError> {
        let user = self.user_by_id(id).await?;

        self.session
            .query("DELETE FROM follows WHERE follower_id = ?", (id,))
            .await?;
        for follower in self.follower_ids(id).await? {
            self.session
                .query(
                    "DELETE FROM follows WHERE follower_id = ? AND following_id = ?",
                    (follower, id),
                )
                .await?;
        }

        if with_posts {
            let posts = self.posts_by_author(id).await?;
            debug!("Deleting {} posts of user {}", posts.len(), id);
            for post in posts {
                self.session
                    .query("DELETE FROM posts WHERE id = ?", (post.id,))
                    .await?;
            }
        }

        self.session
            .query("DELETE FROM users WHERE id = ?", (id,))
            .await?;
        self.session
            .query(
                "DELETE FROM users_by_username WHERE username = ?",
                (&user.username,),
            )
            .await?;
        Ok(())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        let author = self.user_by_id(post.author_id).await?;

        let now = Utc::now();
        let ts = CqlTimestamp(now.timestamp_millis());
        let hashtags: Vec<String> = post.hashtags.iter().cloned().collect();
        let mut id = next_id();
        for attempt in 1.. {
            let insert = self
                .session
                .query(
                    format!(
                        "INSERT INTO posts ({}) VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                        POST_COLUMNS
                    ),
                    (id, post.author_id, &post.content, &hashtags, ts, ts),
                )
                .await?;
            if applied(&insert) {
                break;
            }
            id = next_id_after(id, attempt)?;
        }

        Ok(Post {
            id,
            author_id: post.author_id,
            author: Some(author.username),
            content: post.content,
            hashtags: post.hashtags,
            created_at: now,
            updated_at: now,
        })
    }

    async fn post_by_id(&self, id: i64) -> Result<Post, StoreError> {
        let result = self
            .session
            .query(
                format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS),
                (id,),
            )
            .await?;
        let found = posts(result);
        if found.is_empty() {
            return Err(StoreError::NotFound);
        }
        let mut found = self.fill_authors(found).await?;
        Ok(found.swap_remove(0))
    }

    async fn update_post(
        &self,
        id: i64,
        content: &str,
        hashtags: &HashSet<String>,
    ) -> Result<Post, StoreError> {
        let ts = CqlTimestamp(Utc::now().timestamp_millis());
        let tags: Vec<String> = hashtags.iter().cloned().collect();
        let result = self
            .session
            .query(
                "UPDATE posts SET content = ?, hashtags = ?, updated_at = ? WHERE id = ? IF EXISTS",
                (content, tags, ts, id),
            )
            .await?;
        if !applied(&result) {
            return Err(StoreError::NotFound);
        }
        self.post_by_id(id).await
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        let result = self
            .session
            .query("DELETE FROM posts WHERE id = ? IF EXISTS", (id,))
            .await?;
        if !applied(&result) {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_posts(&self, query: &PostQuery) -> Result<Vec<Post>, StoreError> {
        let candidates = match query.scope {
            PostScope::Author(id) => self.posts_by_author(id).await?,
            PostScope::FollowedBy(id) => {
                let authors = self.following_ids(id).await?;
                try_join_all(authors.into_iter().map(|a| self.posts_by_author(a)))
                    .await?
                    .into_iter()
                    .flatten()
                    .collect()
            }
            PostScope::All => {
                let result = match &query.hashtag {
                    Some(tag) => {
                        self.session
                            .query(
                                format!(
                                    "SELECT {} FROM posts WHERE hashtags CONTAINS ? ALLOW FILTERING",
                                    POST_COLUMNS
                                ),
                                (tag,),
                            )
                            .await?
                    }
                    None => {
                        self.session
                            .query(format!("SELECT {} FROM posts", POST_COLUMNS), &[])
                            .await?
                    }
                };
                posts(result)
            }
        };

        let matching = candidates
            .into_iter()
            .filter(|post| query.matches_hashtag(post))
            .collect();
        self.fill_authors(query.paginate(matching)).await
    }

    async fn insert_follow(&self, follower_id: i64, following_id: i64) -> Result<(), StoreError> {
        self.user_by_id(follower_id).await?;
        self.user_by_id(following_id).await?;

        let ts = CqlTimestamp(Utc::now().timestamp_millis());
        let result = self
            .session
            .query(
                "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?, ?, ?) IF NOT EXISTS",
                (follower_id, following_id, ts),
            )
            .await?;
        if !applied(&result) {
            return Err(StoreError::Duplicate);
        }
        Ok(())
    }

    async fn delete_follow(&self, follower_id: i64, following_id: i64) -> Result<(), StoreError> {
        let result = self
            .session
            .query(
                "DELETE FROM follows WHERE follower_id = ? AND following_id = ? IF EXISTS",
                (follower_id, following_id),
            )
            .await?;
        if !applied(&result) {
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
        let ids: HashSet<i64> = match relation {
            FollowRelation::Followers => self.follower_ids(user_id).await?,
            FollowRelation::Following => self.following_ids(user_id).await?,
            FollowRelation::Mutual => {
                let following = self.following_ids(user_id).await?;
                self.follower_ids(user_id)
                    .await?
                    .intersection(&following)
                    .copied()
                    .collect()
            }
        };
        let users = self.users_by_ids(ids).await?;
        Ok(paginate_users(users, page))
    }
}

/// Insert attempts per row before a fresh id is no longer tried.
const ID_ATTEMPTS: usize = 4;

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Time-ordered id: milliseconds since the epoch in the high bits, random low
/// bits. Ids from one process are strictly increasing; a clash with another
/// process is caught by the `IF NOT EXISTS` inserts.
fn next_id() -> i64 {
    let candidate = (Utc::now().timestamp_millis() << 16) | i64::from(rand::random::<u16>());
    let (Ok(last) | Err(last)) = LAST_ID.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
        Some(candidate.max(last + 1))
    });
    candidate.max(last + 1)
}

/// A replacement for an id that turned out to be taken.
fn next_id_after(taken: i64, attempt: usize) -> Result<i64, StoreError> {
    if attempt >= ID_ATTEMPTS {
        return Err(StoreError::Backend(format!(
            "no free id after {} attempts",
            attempt
        )));
    }
    warn!("Id {} already in use, retrying", taken);
    Ok(next_id())
}

fn rows(result: QueryResult) -> Vec<Row> {
    result.rows.unwrap_or_default()
}

fn posts(result: QueryResult) -> Vec<Post> {
    rows(result).iter().filter_map(parse_post).collect()
}

/// Reads the `[applied]` column of a lightweight-transaction result.
fn applied(result: &QueryResult) -> bool {
    result
        .rows
        .as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| row.columns.first())
        .map_or(false, |col| matches!(col, Some(CqlValue::Boolean(true))))
}

fn bigint(v: &Option<CqlValue>) -> Option<i64> {
    match v.as_ref()? {
        CqlValue::BigInt(n) => Some(*n),
        _ => None,
    }
}

fn text(v: &Option<CqlValue>) -> Option<String> {
    match v.as_ref()? {
        CqlValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn timestamp(v: &Option<CqlValue>) -> Option<DateTime<Utc>> {
    match v.as_ref()? {
        CqlValue::Timestamp(ts) => DateTime::<Utc>::from_timestamp_millis(ts.0),
        _ => None,
    }
}

/// An empty set comes back as null.
fn text_set(v: &Option<CqlValue>) -> HashSet<String> {
    match v {
        Some(CqlValue::Set(items)) | Some(CqlValue::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                CqlValue::Text(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => HashSet::new(),
    }
}

fn parse_user(row: &Row) -> Option<User> {
    let c = &row.columns;
    Some(User {
        id: bigint(c.first()?)?,
        username: text(c.get(1)?)?,
        password_hash: text(c.get(2)?).unwrap_or_default(),
        role: text(c.get(3)?)?.parse().ok()?,
        created_at: timestamp(c.get(4)?)?,
        updated_at: timestamp(c.get(5)?)?,
    })
}

fn parse_post(row: &Row) -> Option<Post> {
    let c = &row.columns;
    Some(Post {
        id: bigint(c.first()?)?,
        author_id: bigint(c.get(1)?)?,
        author: None,
        content: text(c.get(2)?)?,
        hashtags: text_set(c.get(3)?),
        created_at: timestamp(c.get(4)?)?,
        updated_at: timestamp(c.get(5)?)?,
    })
}
