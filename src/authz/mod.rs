//! Role- and ownership-based authorization.
//!
//! One fixed matrix decides `(role, action, kind class)`; an ownership
//! predicate refines `AllowOwned` decisions at call time. Handlers never
//! compare role strings themselves; this module is the only consumer of
//! [`Role`] semantics.

use crate::auth::credentials::Actor;
use crate::error::Error;
use crate::schema::{self, KindClass, KindDescriptor};
use crate::store::repository::Entity;

/// Fixed role set. Parsing is case-insensitive and tolerant of separators
/// ("BU Head", "bu_head" and "BUHEAD" are the same role).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Admin,
    BuHead,
    DeliveryManager,
    ProjectManager,
    HrManager,
    TeamMember,
    Developer,
    Reviewer,
}

impl Role {
    /// Canonical display form, also the value persisted on the actor row.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::BuHead => "BU Head",
            Self::DeliveryManager => "Delivery Manager",
            Self::ProjectManager => "Project Manager",
            Self::HrManager => "HR Manager",
            Self::TeamMember => "Team Member",
            Self::Developer => "Developer",
            Self::Reviewer => "Reviewer",
        }
    }

    /// Parse a stored or user-supplied role name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "admin" => Some(Self::Admin),
            "buhead" => Some(Self::BuHead),
            "deliverymanager" => Some(Self::DeliveryManager),
            "projectmanager" => Some(Self::ProjectManager),
            "hrmanager" => Some(Self::HrManager),
            "teammember" => Some(Self::TeamMember),
            "developer" => Some(Self::Developer),
            "reviewer" => Some(Self::Reviewer),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityAction {
    Create,
    Read,
    Update,
    Archive,
}

impl EntityAction {
    /// Audit log value for this action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Read => "Read",
            Self::Update => "Update",
            Self::Archive => "Archive",
        }
    }
}

/// Matrix outcome before the ownership predicate is consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Allowed only when the ownership predicate holds for the instance.
    AllowOwned,
    Deny,
}

/// The fixed `(role, action, kind class)` matrix. Unknown combinations
/// default to `Deny`.
#[must_use]
pub fn decision(role: Role, action: EntityAction, descriptor: &KindDescriptor) -> Decision {
    if role == Role::Admin {
        return Decision::Allow;
    }
    match descriptor.class {
        KindClass::MasterData => match action {
            EntityAction::Read => Decision::Allow,
            // Reference data is curated centrally.
            EntityAction::Create | EntityAction::Update | EntityAction::Archive => Decision::Deny,
        },
        KindClass::Owned => match action {
            EntityAction::Read | EntityAction::Update | EntityAction::Archive => {
                Decision::AllowOwned
            }
            EntityAction::Create => {
                if schema::bu_scoped(role) {
                    Decision::AllowOwned
                } else if descriptor.team_creatable {
                    Decision::Allow
                } else {
                    Decision::Deny
                }
            }
        },
    }
}

/// Ownership predicate: does `actor` own `entity` for its kind?
#[must_use]
pub fn owns(actor: &Actor, descriptor: &KindDescriptor, entity: &Entity) -> bool {
    if actor.role == Role::Admin {
        return true;
    }
    if schema::bu_scoped(actor.role) {
        return match (&entity.owner_bu_id, &actor.business_unit_id) {
            (Some(entity_bu), Some(actor_bu)) => entity_bu == actor_bu,
            _ => false,
        };
    }
    // Team roles own what they created or are assigned to.
    if entity.created_by == actor.username {
        return true;
    }
    descriptor
        .owner_actor_field
        .and_then(|field| entity.payload.get(field))
        .and_then(|value| value.as_str())
        .is_some_and(|owner| owner == actor.username)
}

/// Authorize a write against an existing entity instance.
///
/// # Errors
/// `Forbidden` when the matrix denies or the ownership predicate fails.
pub fn check_instance(
    actor: &Actor,
    action: EntityAction,
    descriptor: &KindDescriptor,
    entity: &Entity,
) -> Result<(), Error> {
    match decision(actor.role, action, descriptor) {
        Decision::Allow => Ok(()),
        Decision::AllowOwned => {
            if owns(actor, descriptor, entity) {
                Ok(())
            } else {
                Err(Error::Forbidden("not permitted for this entity"))
            }
        }
        Decision::Deny => Err(Error::Forbidden("not permitted for this role")),
    }
}

/// Authorize a create from the incoming payload (no instance exists yet).
///
/// For BU-scoped roles the new entity must land in the actor's own business
/// unit; payloads without an owning BU field fall back to the matrix alone.
///
/// # Errors
/// `Forbidden` when the matrix denies or the payload targets a foreign BU.
pub fn check_create(
    actor: &Actor,
    descriptor: &KindDescriptor,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<(), Error> {
    match decision(actor.role, EntityAction::Create, descriptor) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(Error::Forbidden("not permitted for this role")),
        Decision::AllowOwned => {
            let target_bu = descriptor
                .owner_bu_field
                .and_then(|field| payload.get(field))
                .and_then(|value| value.as_str());
            let actor_bu = actor.business_unit_id.as_deref();
            match (target_bu, actor_bu) {
                (Some(target), Some(own)) if target == own => Ok(()),
                (None, _) => Ok(()),
                _ => Err(Error::Forbidden("not permitted outside your business unit")),
            }
        }
    }
}

/// Visible subset for collection reads. Reads are filtered, never denied,
/// unless the matrix denies the action outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListScope {
    /// No filter beyond the default Archived exclusion.
    All,
    /// Rows owned by the given business unit.
    BusinessUnit(String),
    /// Rows created by or assigned to the given username.
    Actor {
        username: String,
        owner_field: Option<&'static str>,
    },
}

/// Derive the list filter for an actor on a kind.
///
/// # Errors
/// `Forbidden` only when the matrix denies reads entirely.
pub fn list_scope(actor: &Actor, descriptor: &KindDescriptor) -> Result<ListScope, Error> {
    match decision(actor.role, EntityAction::Read, descriptor) {
        Decision::Allow => Ok(ListScope::All),
        Decision::Deny => Err(Error::Forbidden("not permitted for this role")),
        Decision::AllowOwned => {
            if schema::bu_scoped(actor.role) {
                match &actor.business_unit_id {
                    Some(bu) => Ok(ListScope::BusinessUnit(bu.clone())),
                    // A manager without a BU falls back to authored rows.
                    None => Ok(ListScope::Actor {
                        username: actor.username.clone(),
                        owner_field: descriptor.owner_actor_field,
                    }),
                }
            } else {
                Ok(ListScope::Actor {
                    username: actor.username.clone(),
                    owner_field: descriptor.owner_actor_field,
                })
            }
        }
    }
}

/// Is the single entity visible to the actor at all? Used by point reads,
/// which report an invisible entity as missing rather than forbidden.
#[must_use]
pub fn can_view(actor: &Actor, descriptor: &KindDescriptor, entity: &Entity) -> bool {
    match decision(actor.role, EntityAction::Read, descriptor) {
        Decision::Allow => true,
        Decision::AllowOwned => owns(actor, descriptor, entity),
        Decision::Deny => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{Actor, ActorStatus};
    use crate::schema::lookup;
    use crate::store::repository::EntityStatus;
    use serde_json::json;

    fn actor(role: Role, bu: Option<&str>, username: &str) -> Actor {
        Actor {
            actor_id: format!("01-{username}"),
            username: username.to_string(),
            display_name: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: String::new(),
            role,
            business_unit_id: bu.map(str::to_string),
            status: ActorStatus::Active,
        }
    }

    fn entity(kind: &'static str, owner_bu: Option<&str>, created_by: &str) -> Entity {
        Entity {
            id: "E1".to_string(),
            kind,
            owner_bu_id: owner_bu.map(str::to_string),
            payload: serde_json::Map::new(),
            status: EntityStatus::Active,
            created_at: String::new(),
            created_by: created_by.to_string(),
            updated_at: String::new(),
            updated_by: created_by.to_string(),
        }
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("bu head"), Some(Role::BuHead));
        assert_eq!(Role::parse("bu_head"), Some(Role::BuHead));
        assert_eq!(Role::parse("Project Manager"), Some(Role::ProjectManager));
        assert_eq!(Role::parse("teamMember"), Some(Role::TeamMember));
        assert_eq!(Role::parse("intern"), None);
    }

    #[test]
    fn role_round_trips_through_display_form() {
        for role in [
            Role::Admin,
            Role::BuHead,
            Role::DeliveryManager,
            Role::ProjectManager,
            Role::HrManager,
            Role::TeamMember,
            Role::Developer,
            Role::Reviewer,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn admin_is_allowed_everything() {
        let descriptor = lookup("Tasks").expect("registered");
        for action in [
            EntityAction::Create,
            EntityAction::Read,
            EntityAction::Update,
            EntityAction::Archive,
        ] {
            assert_eq!(decision(Role::Admin, action, descriptor), Decision::Allow);
        }
    }

    #[test]
    fn master_data_writes_are_admin_only() {
        let descriptor = lookup("TaskTypes").expect("registered");
        assert_eq!(
            decision(Role::BuHead, EntityAction::Create, descriptor),
            Decision::Deny
        );
        assert_eq!(
            decision(Role::Developer, EntityAction::Update, descriptor),
            Decision::Deny
        );
        assert_eq!(
            decision(Role::Developer, EntityAction::Read, descriptor),
            Decision::Allow
        );
    }

    #[test]
    fn team_roles_create_only_team_creatable_kinds() {
        let tasks = lookup("Tasks").expect("registered");
        let projects = lookup("Projects").expect("registered");
        assert_eq!(
            decision(Role::Developer, EntityAction::Create, tasks),
            Decision::Allow
        );
        assert_eq!(
            decision(Role::Developer, EntityAction::Create, projects),
            Decision::Deny
        );
    }

    #[test]
    fn bu_manager_owns_entities_in_own_bu_only() {
        let descriptor = lookup("BusinessUnit").expect("registered");
        let manager = actor(Role::BuHead, Some("BU1"), "bea");
        assert!(owns(&manager, descriptor, &entity("BusinessUnit", Some("BU1"), "root")));
        assert!(!owns(&manager, descriptor, &entity("BusinessUnit", Some("BU2"), "root")));
        assert!(!owns(&manager, descriptor, &entity("BusinessUnit", None, "root")));
    }

    #[test]
    fn team_member_owns_created_or_assigned() {
        let descriptor = lookup("Tasks").expect("registered");
        let dev = actor(Role::Developer, Some("BU1"), "dan");

        assert!(owns(&dev, descriptor, &entity("Task", Some("BU1"), "dan")));
        assert!(!owns(&dev, descriptor, &entity("Task", Some("BU1"), "someone")));

        let mut assigned = entity("Task", Some("BU1"), "someone");
        assigned.payload = json!({"assignee": "dan"})
            .as_object()
            .cloned()
            .expect("object");
        assert!(owns(&dev, descriptor, &assigned));
    }

    #[test]
    fn foreign_bu_update_is_forbidden() {
        let descriptor = lookup("BusinessUnit").expect("registered");
        let bob = actor(Role::TeamMember, Some("BU2"), "bob");
        let target = entity("BusinessUnit", Some("BU1"), "alice");
        let result = check_instance(&bob, EntityAction::Update, descriptor, &target);
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[test]
    fn create_outside_own_bu_is_forbidden() {
        let descriptor = lookup("Projects").expect("registered");
        let manager = actor(Role::ProjectManager, Some("BU1"), "pam");
        let payload = json!({"project_name": "X", "business_unit_id": "BU2"})
            .as_object()
            .cloned()
            .expect("object");
        assert!(matches!(
            check_create(&manager, descriptor, &payload),
            Err(Error::Forbidden(_))
        ));

        let own = json!({"project_name": "X", "business_unit_id": "BU1"})
            .as_object()
            .cloned()
            .expect("object");
        assert!(check_create(&manager, descriptor, &own).is_ok());
    }

    #[test]
    fn list_scope_follows_role_class() {
        let descriptor = lookup("Tasks").expect("registered");

        let admin = actor(Role::Admin, None, "root");
        assert_eq!(list_scope(&admin, descriptor).expect("allow"), ListScope::All);

        let manager = actor(Role::DeliveryManager, Some("BU1"), "dee");
        assert_eq!(
            list_scope(&manager, descriptor).expect("allow"),
            ListScope::BusinessUnit("BU1".to_string())
        );

        let dev = actor(Role::Developer, Some("BU1"), "dan");
        assert_eq!(
            list_scope(&dev, descriptor).expect("allow"),
            ListScope::Actor {
                username: "dan".to_string(),
                owner_field: Some("assignee"),
            }
        );
    }

    #[test]
    fn point_read_visibility_matches_ownership() {
        let descriptor = lookup("Tasks").expect("registered");
        let dev = actor(Role::Developer, Some("BU1"), "dan");
        assert!(can_view(&dev, descriptor, &entity("Task", None, "dan")));
        assert!(!can_view(&dev, descriptor, &entity("Task", None, "someone")));
    }
}
