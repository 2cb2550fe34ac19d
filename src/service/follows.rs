use std::sync::Arc;

use log::debug;

use crate::error::{Entity, Error, Result, StoreError};
use crate::models::User;
use crate::pagination::Pagination;
use crate::store::{FollowRelation, Store};

pub struct FollowService {
    store: Arc<dyn Store>,
}

impl FollowService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn follow(&self, follower_id: i64, following_id: i64) -> Result<()> {
        if follower_id == following_id {
            return Err(Error::SelfFollow);
        }

        self.store
            .insert_follow(follower_id, following_id)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => Error::AlreadyFollowing,
                StoreError::NotFound => Error::NotFound(Entity::User),
                e => Error::storage("create follow")(e),
            })?;

        debug!("User {} now follows {}", follower_id, following_id);
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: i64, following_id: i64) -> Result<()> {
        self.store
            .delete_follow(follower_id, following_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => Error::NotFollowing,
                e => Error::storage("delete follow")(e),
            })?;

        debug!("User {} unfollowed {}", follower_id, following_id);
        Ok(())
    }

    pub async fn get_followers(&self, user_id: i64, page: Pagination) -> Result<Vec<User>> {
        self.find(FollowRelation::Followers, user_id, page, "query followers")
            .await
    }

    pub async fn get_following(&self, user_id: i64, page: Pagination) -> Result<Vec<User>> {
        self.find(FollowRelation::Following, user_id, page, "query following")
            .await
    }

    /// Users who follow `user_id` and are followed back by it.
    pub async fn get_mutual_follows(&self, user_id: i64, page: Pagination) -> Result<Vec<User>> {
        self.find(FollowRelation::Mutual, user_id, page, "query mutual follows")
            .await
    }

    async fn find(
        &self,
        relation: FollowRelation,
        user_id: i64,
        page: Pagination,
        op: &'static str,
    ) -> Result<Vec<User>> {
        self.store
            .find_users(relation, user_id, page)
            .await
            .map_err(Error::storage(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Role};
    use crate::store::MemoryStore;

    async fn setup(names: &[&str]) -> (FollowService, Vec<User>) {
        let store = Arc::new(MemoryStore::new());
        let mut users = Vec::new();
        for name in names {
            let user = store
                .create_user(NewUser {
                    username: name.to_string(),
                    password_hash: String::new(),
                    role: Role::User,
                })
                .await
                .unwrap();
            users.push(user);
        }
        (FollowService::new(store), users)
    }

    fn names(users: &[User]) -> Vec<&str> {
        users.iter().map(|u| u.username.as_str()).collect()
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let (follows, users) = setup(&["alice"]).await;
        let a = users[0].id;
        assert!(matches!(follows.follow(a, a).await, Err(Error::SelfFollow)));
    }

    #[tokio::test]
    async fn duplicate_follow_is_rejected() {
        let (follows, users) = setup(&["alice", "bob"]).await;
        let (a, b) = (users[0].id, users[1].id);
        follows.follow(a, b).await.unwrap();
        assert!(matches!(
            follows.follow(a, b).await,
            Err(Error::AlreadyFollowing)
        ));
    }

    #[tokio::test]
    async fn unfollow_without_follow_fails() {
        let (follows, users) = setup(&["alice", "bob"]).await;
        let (a, b) = (users[0].id, users[1].id);
        assert!(matches!(
            follows.unfollow(a, b).await,
            Err(Error::NotFollowing)
        ));

        follows.follow(a, b).await.unwrap();
        follows.unfollow(a, b).await.unwrap();
        assert!(matches!(
            follows.unfollow(a, b).await,
            Err(Error::NotFollowing)
        ));
    }

    #[tokio::test]
    async fn following_an_unknown_user_is_not_found() {
        let (follows, users) = setup(&["alice"]).await;
        assert!(matches!(
            follows.follow(users[0].id, 777).await,
            Err(Error::NotFound(Entity::User))
        ));
    }

    #[tokio::test]
    async fn lists_are_sorted_by_username_and_paginated() {
        let (follows, users) = setup(&["zed", "amy", "kim", "bea"]).await;
        let zed = users[0].id;
        for other in &users[1..] {
            follows.follow(other.id, zed).await.unwrap();
        }
        follows.follow(zed, users[2].id).await.unwrap();

        let all = follows
            .get_followers(zed, Pagination::default())
            .await
            .unwrap();
        assert_eq!(names(&all), vec!["amy", "bea", "kim"]);

        let second = follows
            .get_followers(zed, Pagination::new(2, 2, true).unwrap())
            .await
            .unwrap();
        assert_eq!(names(&second), vec!["kim"]);

        let following = follows
            .get_following(zed, Pagination::default())
            .await
            .unwrap();
        assert_eq!(names(&following), vec!["kim"]);
    }

    #[tokio::test]
    async fn mutual_follows_need_both_directions() {
        let (follows, users) = setup(&["alice", "bob", "carol"]).await;
        let (a, b, c) = (users[0].id, users[1].id, users[2].id);
        follows.follow(a, b).await.unwrap();
        follows.follow(b, a).await.unwrap();
        follows.follow(c, a).await.unwrap();

        let mutual = follows
            .get_mutual_follows(a, Pagination::default())
            .await
            .unwrap();
        assert_eq!(names(&mutual), vec!["bob"]);
    }
}
