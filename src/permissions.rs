use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{auth::AuthUser, error::AppError};

/// Role
///
/// The stored role of a user. Superusers are not a role value; they carry the
/// `is_superuser` flag and are treated as admins by [`Principal::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// Actor
///
/// The caller of the current request, resolved once by the extractor in `auth.rs` and
/// handed to every handler explicitly.
#[derive(Debug, Clone)]
pub enum Actor {
    Anonymous,
    User(AuthUser),
}

impl Actor {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Actor::Anonymous => None,
            Actor::User(user) => Some(user),
        }
    }
}

/// The four permission tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User,
    Moderator,
    Admin,
}

impl Principal {
    pub fn of(actor: &Actor) -> Self {
        match actor {
            Actor::Anonymous => Principal::Anonymous,
            Actor::User(user) if user.is_superuser => Principal::Admin,
            Actor::User(user) => match user.role {
                Role::User => Principal::User,
                Role::Moderator => Principal::Moderator,
                Role::Admin => Principal::Admin,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// list / retrieve
    Read,
    Create,
    /// partial update or delete
    Modify,
}

/// What the action is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Categories, genres and titles.
    Catalog,
    /// Reviews and comments. `author` is `None` for collection-level operations.
    Discussion { author: Option<Uuid> },
    /// The caller's own profile behind `/users/me`.
    OwnProfile,
    /// Any user record, addressed by username.
    UserDirectory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// The caller must authenticate first.
    Unauthenticated,
    Forbidden,
}

impl Decision {
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Unauthenticated => Err(AppError::Unauthorized),
            Decision::Forbidden => Err(AppError::Forbidden),
        }
    }
}

/// decide
///
/// The whole permission policy as one pure function of caller, action and target.
pub fn decide(actor: &Actor, action: Action, target: Target) -> Decision {
    let principal = Principal::of(actor);

    match (target, action) {
        (Target::Catalog | Target::Discussion { .. }, Action::Read) => Decision::Allow,
        _ if principal == Principal::Anonymous => Decision::Unauthenticated,

        (Target::Catalog, _) | (Target::UserDirectory, _) => admin_only(principal),

        (Target::OwnProfile, Action::Read | Action::Modify) => Decision::Allow,
        (Target::OwnProfile, Action::Create) => Decision::Forbidden,

        (Target::Discussion { .. }, Action::Create) => Decision::Allow,
        (Target::Discussion { author }, Action::Modify) => {
            let is_author = match (author, actor.user()) {
                (Some(author), Some(user)) => author == user.id,
                _ => false,
            };
            if is_author || matches!(principal, Principal::Moderator | Principal::Admin) {
                Decision::Allow
            } else {
                Decision::Forbidden
            }
        }
    }
}

fn admin_only(principal: Principal) -> Decision {
    if principal == Principal::Admin {
        Decision::Allow
    } else {
        Decision::Forbidden
    }
}

/// authorize
///
/// `decide` turned into an early-return for handlers.
pub fn authorize(actor: &Actor, action: Action, target: Target) -> Result<(), AppError> {
    decide(actor, action, target).into_result()
}

/// The authenticated caller, or 401. Used before an object lookup so anonymous callers
/// are turned away without learning whether the object exists.
pub fn require_user(actor: &Actor) -> Result<&AuthUser, AppError> {
    actor.user().ok_or(AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> Actor {
        Actor::User(AuthUser {
            id: Uuid::new_v4(),
            username: format!("{}-user", role.as_str()),
            role,
            is_superuser: false,
        })
    }

    fn superuser() -> Actor {
        Actor::User(AuthUser {
            id: Uuid::new_v4(),
            username: "root".to_string(),
            role: Role::User,
            is_superuser: true,
        })
    }

    #[test]
    fn reads_on_public_resources_are_always_allowed() {
        for caller in [Actor::Anonymous, actor(Role::User), actor(Role::Moderator)] {
            assert_eq!(decide(&caller, Action::Read, Target::Catalog), Decision::Allow);
            assert_eq!(
                decide(&caller, Action::Read, Target::Discussion { author: None }),
                Decision::Allow
            );
        }
    }

    #[test]
    fn catalog_writes_are_admin_only() {
        assert_eq!(
            decide(&Actor::Anonymous, Action::Create, Target::Catalog),
            Decision::Unauthenticated
        );
        assert_eq!(decide(&actor(Role::User), Action::Create, Target::Catalog), Decision::Forbidden);
        assert_eq!(
            decide(&actor(Role::Moderator), Action::Modify, Target::Catalog),
            Decision::Forbidden
        );
        assert_eq!(decide(&actor(Role::Admin), Action::Modify, Target::Catalog), Decision::Allow);
        assert_eq!(decide(&superuser(), Action::Create, Target::Catalog), Decision::Allow);
    }

    #[test]
    fn discussion_edits_allow_author_moderator_and_admin() {
        let author = actor(Role::User);
        let author_id = author.user().map(|u| u.id);
        let target = Target::Discussion { author: author_id };

        assert_eq!(decide(&author, Action::Modify, target), Decision::Allow);
        assert_eq!(decide(&actor(Role::Moderator), Action::Modify, target), Decision::Allow);
        assert_eq!(decide(&actor(Role::Admin), Action::Modify, target), Decision::Allow);
        assert_eq!(decide(&actor(Role::User), Action::Modify, target), Decision::Forbidden);
        assert_eq!(decide(&Actor::Anonymous, Action::Modify, target), Decision::Unauthenticated);
    }

    #[test]
    fn any_authenticated_user_may_post_reviews_and_comments() {
        let target = Target::Discussion { author: None };
        assert_eq!(decide(&actor(Role::User), Action::Create, target), Decision::Allow);
        assert_eq!(decide(&Actor::Anonymous, Action::Create, target), Decision::Unauthenticated);
    }

    #[test]
    fn user_directory_is_admin_only_even_for_reads() {
        assert_eq!(
            decide(&actor(Role::Moderator), Action::Read, Target::UserDirectory),
            Decision::Forbidden
        );
        assert_eq!(
            decide(&Actor::Anonymous, Action::Read, Target::UserDirectory),
            Decision::Unauthenticated
        );
        assert_eq!(decide(&actor(Role::Admin), Action::Modify, Target::UserDirectory), Decision::Allow);
    }

    #[test]
    fn own_profile_needs_only_authentication() {
        assert_eq!(decide(&actor(Role::User), Action::Modify, Target::OwnProfile), Decision::Allow);
        assert_eq!(
            decide(&Actor::Anonymous, Action::Read, Target::OwnProfile),
            Decision::Unauthenticated
        );
    }

    #[test]
    fn role_parsing_rejects_unknown_values() {
        assert_eq!(Role::try_from("moderator".to_string()).ok(), Some(Role::Moderator));
        assert!(Role::try_from("superadmin".to_string()).is_err());
    }
}
