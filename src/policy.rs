//! Access policy: which roles may invoke which access tags.

use crate::{context::CurrentUser, error::AppError};

pub const ROLE_ANONYMOUS: &str = "ROLE_ANONYMOUS";
pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";
pub const ROLE_SUPERADMIN: &str = "ROLE_SUPERADMIN";

pub const ROLES: [&str; 4] = [ROLE_ANONYMOUS, ROLE_USER, ROLE_ADMIN, ROLE_SUPERADMIN];

const ANONYMOUS_TAGS: &[&str] = &[
    "auth:login",
    "auth:refresh-tokens",
    "users:list",
    "users:get-by-id",
    "users:create",
    "users:get-posts-by-user-id",
    "posts:list",
    "posts:get-by-id",
];

const USER_TAGS: &[&str] = &[
    "auth:logout",
    "auth:logout-all-sessions",
    "users:current",
    "users:update",
    "users:change-password",
    "users:change-email",
    "posts:create",
    "posts:update",
    "posts:remove",
];

const ADMIN_TAGS: &[&str] = &["auth:all", "users:all", "posts:all"];

/// Tags granted to a role. Every authenticated role inherits what anonymous callers get.
fn grants(role: &str, tag: &str) -> bool {
    let listed = |tags: &[&str]| tags.iter().any(|granted| matches(granted, tag));
    match role {
        ROLE_SUPERADMIN => true,
        ROLE_ADMIN => listed(ADMIN_TAGS) || listed(USER_TAGS) || listed(ANONYMOUS_TAGS),
        ROLE_USER => listed(USER_TAGS) || listed(ANONYMOUS_TAGS),
        _ => listed(ANONYMOUS_TAGS),
    }
}

/// `"<domain>:all"` covers every tag of that domain.
fn matches(granted: &str, tag: &str) -> bool {
    if granted == tag {
        return true;
    }
    match (granted.split_once(':'), tag.split_once(':')) {
        (Some((domain, "all")), Some((tag_domain, _))) => domain == tag_domain,
        _ => false,
    }
}

/// check_access
///
/// Resolves whether the caller (anonymous when `None`) may invoke `tag`.
pub fn check_access(tag: &str, user: Option<&CurrentUser>) -> Result<(), AppError> {
    let role = user.map_or(ROLE_ANONYMOUS, |u| u.role.as_str());
    if grants(role, tag) {
        Ok(())
    } else {
        tracing::debug!(tag, role, "access denied");
        Err(AppError::forbidden(format!(
            "Access denied, don't have permissions for '{tag}'."
        )))
    }
}
