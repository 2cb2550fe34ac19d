use std::sync::Arc;

use crate::store::Store;

pub mod follows;
pub mod posts;
pub mod users;

pub use follows::FollowService;
pub use posts::{PostService, SearchScope};
pub use users::UserService;

/// All services sharing one store.
pub struct Services {
    pub users: UserService,
    pub posts: PostService,
    pub follows: FollowService,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, bcrypt_cost: u32) -> Self {
        Self {
            users: UserService::new(store.clone(), bcrypt_cost),
            posts: PostService::new(store.clone()),
            follows: FollowService::new(store),
        }
    }
}
