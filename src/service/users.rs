use std::sync::Arc;

use log::info;
use tokio::task;

use crate::auth::policy;
use crate::error::{Entity, Error, Result, StoreError};
use crate::models::{NewUser, Role, User};
use crate::store::Store;

const MIN_USERNAME_CHARS: usize = 3;
const MIN_PASSWORD_CHARS: usize = 6;

pub struct UserService {
    store: Arc<dyn Store>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<User> {
        if username.chars().count() < MIN_USERNAME_CHARS
            || password.chars().count() < MIN_PASSWORD_CHARS
        {
            return Err(Error::WeakCredentials);
        }

        let password = password.to_string();
        let cost = self.bcrypt_cost;
        let password_hash = task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        let user = self
            .store
            .create_user(NewUser {
                username: username.to_string(),
                password_hash,
                role: Role::User,
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => Error::UsernameTaken,
                e => Error::storage("create user")(e),
            })?;

        info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Checks a username/password pair. Unknown users and wrong passwords
    /// are indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .user_by_username(username)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => Error::InvalidCredentials,
                e => Error::storage("get user by username")(e),
            })?;

        let password = password.to_string();
        let hash = user.password_hash.clone();
        if !task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?? {
            return Err(Error::InvalidCredentials);
        }
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User> {
        self.store
            .user_by_id(id)
            .await
            .map_err(Error::lookup("get user", Entity::User))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<User> {
        self.store
            .user_by_username(username)
            .await
            .map_err(Error::lookup("get user by username", Entity::User))
    }

    pub async fn delete_account(&self, actor_id: i64, target_id: i64, with_posts: bool) -> Result<()> {
        let actor = self.get_by_id(actor_id).await?;
        let target = self.get_by_id(target_id).await?;
        if !policy::can_delete_account(&actor, &target) {
            return Err(Error::Forbidden);
        }

        self.store
            .delete_user(target.id, with_posts)
            .await
            .map_err(Error::lookup("delete user", Entity::User))?;

        info!(
            "User {} deleted account {} (with_posts={})",
            actor.id, target.id, with_posts
        );
        Ok(())
    }

    pub async fn change_role(&self, actor_id: i64, target_id: i64, new_role: &str) -> Result<()> {
        if actor_id == target_id {
            return Err(Error::SelfRoleChange);
        }

        let actor = self.get_by_id(actor_id).await?;
        if !policy::can_change_role(&actor) {
            return Err(Error::Forbidden);
        }

        let role: Role = new_role.parse()?;
        self.store
            .update_role(target_id, role)
            .await
            .map_err(Error::lookup("update role", Entity::User))?;

        info!("Admin {} set role of user {} to {}", actor.id, target_id, role);
        Ok(())
    }
}
