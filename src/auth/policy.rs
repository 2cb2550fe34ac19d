//! Authorization decisions over already-fetched entities. Callers turn a
//! `false` into [`crate::error::Error::Forbidden`].

use crate::models::{Post, Role, User};

/// Authors may edit their own posts; moderators and admins may edit any.
pub fn can_modify_post(actor: &User, post: &Post) -> bool {
    actor.id == post.author_id || actor.role.is_staff()
}

/// Authors may delete their own posts; only admins may delete others'.
pub fn can_delete_post(actor: &User, post: &Post) -> bool {
    actor.id == post.author_id || actor.role == Role::Admin
}

pub fn can_delete_account(actor: &User, target: &User) -> bool {
    actor.id == target.id || actor.role.is_staff()
}

/// Self-role-change is rejected before this check is reached.
pub fn can_change_role(actor: &User) -> bool {
    actor.role == Role::Admin
}
