//! Static schema registry for the business entity kinds.
//!
//! Every entity kind served under `/api/{Kind}/` is described here: its table,
//! the payload fields it accepts, which field carries its public id, which
//! fields scope ownership, and which fields must reference a live parent.
//! The repository and the authorizer are both parameterized by these
//! descriptors; no handler hard-codes a kind.

use crate::authz::Role;

/// Broad authorization class of a kind; the role matrix keys on this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindClass {
    /// Scoped to a business unit; managers mutate within their BU, team
    /// roles within what they created or are assigned to.
    Owned,
    /// Shared reference data (task types, skills, holidays...); only Admin
    /// mutates, everyone reads.
    MasterData,
}

/// Expected JSON type of a payload field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

#[derive(Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// A payload field that must reference an existing, non-archived entity of
/// another kind at write time.
#[derive(Debug)]
pub struct ParentRef {
    pub field: &'static str,
    pub kind: &'static str,
}

#[derive(Debug)]
pub struct KindDescriptor {
    /// Canonical kind name as recorded in audit rows.
    pub kind: &'static str,
    /// Route aliases, lowercase (singular and plural).
    pub aliases: &'static [&'static str],
    pub table: &'static str,
    /// Payload field carrying the public id; generated when absent on create.
    pub id_field: &'static str,
    pub class: KindClass,
    /// Payload field naming the owning business unit, when applicable.
    pub owner_bu_field: Option<&'static str>,
    /// Kind-specific owner field (e.g. assignee) granting team-role ownership.
    pub owner_actor_field: Option<&'static str>,
    /// Whether team roles may create entities of this kind.
    pub team_creatable: bool,
    pub parents: &'static [ParentRef],
    pub fields: &'static [FieldSpec],
}

impl KindDescriptor {
    /// Look up the spec for a payload field, id field included.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }
}

const fn text(name: &'static str, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        required,
    }
}

const fn number(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Number,
        required: false,
    }
}

static REGISTRY: &[KindDescriptor] = &[
    KindDescriptor {
        kind: "BusinessUnit",
        aliases: &["businessunit", "businessunits"],
        table: "business_units",
        id_field: "business_unit_id",
        class: KindClass::Owned,
        // A business unit is its own ownership scope.
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: None,
        team_creatable: false,
        parents: &[],
        fields: &[
            text("business_unit_id", false),
            text("business_unit_name", true),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "Project",
        aliases: &["project", "projects"],
        table: "projects",
        id_field: "project_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: None,
        team_creatable: false,
        parents: &[ParentRef {
            field: "business_unit_id",
            kind: "BusinessUnit",
        }],
        fields: &[
            text("project_id", false),
            text("project_name", true),
            text("business_unit_id", true),
            text("client_name", false),
            text("start_date", false),
            text("end_date", false),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "Deliverable",
        aliases: &["deliverable", "deliverables"],
        table: "deliverables",
        id_field: "deliverable_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: None,
        team_creatable: false,
        parents: &[ParentRef {
            field: "project_id",
            kind: "Project",
        }],
        fields: &[
            text("deliverable_id", false),
            text("deliverable_name", true),
            text("project_id", true),
            text("business_unit_id", false),
            text("due_date", false),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "Task",
        aliases: &["task", "tasks"],
        table: "tasks",
        id_field: "task_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: Some("assignee"),
        team_creatable: true,
        parents: &[
            ParentRef {
                field: "project_id",
                kind: "Project",
            },
            ParentRef {
                field: "deliverable_id",
                kind: "Deliverable",
            },
            ParentRef {
                field: "task_type_id",
                kind: "TaskType",
            },
            ParentRef {
                field: "task_status_id",
                kind: "TaskStatus",
            },
        ],
        fields: &[
            text("task_id", false),
            text("task_name", true),
            text("project_id", true),
            text("deliverable_id", false),
            text("business_unit_id", false),
            text("task_type_id", false),
            text("task_status_id", false),
            text("assignee", false),
            text("priority", false),
            number("planned_hours"),
            number("actual_hours"),
            text("due_date", false),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "TaskType",
        aliases: &["tasktype", "tasktypes"],
        table: "task_types",
        id_field: "task_type_id",
        class: KindClass::MasterData,
        owner_bu_field: None,
        owner_actor_field: None,
        team_creatable: false,
        parents: &[],
        fields: &[
            text("task_type_id", false),
            text("task_type_name", true),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "TaskStatus",
        aliases: &["taskstatus", "taskstatuses"],
        table: "task_statuses",
        id_field: "task_status_id",
        class: KindClass::MasterData,
        owner_bu_field: None,
        owner_actor_field: None,
        team_creatable: false,
        parents: &[],
        fields: &[
            text("task_status_id", false),
            text("task_status_name", true),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "Issue",
        aliases: &["issue", "issues"],
        table: "issues",
        id_field: "issue_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: Some("assignee"),
        team_creatable: true,
        parents: &[
            ParentRef {
                field: "project_id",
                kind: "Project",
            },
            ParentRef {
                field: "task_id",
                kind: "Task",
            },
        ],
        fields: &[
            text("issue_id", false),
            text("issue_title", true),
            text("project_id", true),
            text("task_id", false),
            text("business_unit_id", false),
            text("assignee", false),
            text("severity", false),
            text("priority", false),
            text("status", false),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "IssueActivity",
        aliases: &["issueactivity", "issueactivities"],
        table: "issue_activities",
        id_field: "issue_activity_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: None,
        team_creatable: true,
        parents: &[ParentRef {
            field: "issue_id",
            kind: "Issue",
        }],
        fields: &[
            text("issue_activity_id", false),
            text("issue_id", true),
            text("business_unit_id", false),
            text("activity_note", true),
            number("hours_spent"),
        ],
    },
    KindDescriptor {
        kind: "Employee",
        aliases: &["employee", "employees"],
        table: "employees",
        id_field: "employee_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: None,
        team_creatable: false,
        parents: &[ParentRef {
            field: "job_role_id",
            kind: "JobRole",
        }],
        fields: &[
            text("employee_id", false),
            text("employee_name", true),
            text("email", false),
            text("business_unit_id", false),
            text("job_role_id", false),
            text("phone", false),
        ],
    },
    KindDescriptor {
        kind: "Skill",
        aliases: &["skill", "skills"],
        table: "skills",
        id_field: "skill_id",
        class: KindClass::MasterData,
        owner_bu_field: None,
        owner_actor_field: None,
        team_creatable: false,
        parents: &[],
        fields: &[
            text("skill_id", false),
            text("skill_name", true),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "Certification",
        aliases: &["certification", "certifications"],
        table: "certifications",
        id_field: "certification_id",
        class: KindClass::MasterData,
        owner_bu_field: None,
        owner_actor_field: None,
        team_creatable: false,
        parents: &[],
        fields: &[
            text("certification_id", false),
            text("certification_name", true),
            text("issuing_body", false),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "JobRole",
        aliases: &["jobrole", "jobroles"],
        table: "job_roles",
        id_field: "job_role_id",
        class: KindClass::MasterData,
        owner_bu_field: None,
        owner_actor_field: None,
        team_creatable: false,
        parents: &[],
        fields: &[
            text("job_role_id", false),
            text("job_role_name", true),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "Holiday",
        aliases: &["holiday", "holidays"],
        table: "holidays",
        id_field: "holiday_id",
        class: KindClass::MasterData,
        owner_bu_field: None,
        owner_actor_field: None,
        team_creatable: false,
        parents: &[],
        fields: &[
            text("holiday_id", false),
            text("holiday_name", true),
            text("holiday_date", true),
            text("description", false),
        ],
    },
    KindDescriptor {
        kind: "Rating",
        aliases: &["rating", "ratings"],
        table: "ratings",
        id_field: "rating_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: None,
        team_creatable: false,
        parents: &[ParentRef {
            field: "employee_id",
            kind: "Employee",
        }],
        fields: &[
            text("rating_id", false),
            text("employee_id", true),
            text("business_unit_id", false),
            number("rating_value"),
            text("period", false),
            text("comments", false),
        ],
    },
    KindDescriptor {
        kind: "Review",
        aliases: &["review", "reviews"],
        table: "reviews",
        id_field: "review_id",
        class: KindClass::Owned,
        owner_bu_field: Some("business_unit_id"),
        owner_actor_field: None,
        team_creatable: false,
        parents: &[ParentRef {
            field: "employee_id",
            kind: "Employee",
        }],
        fields: &[
            text("review_id", false),
            text("employee_id", true),
            text("business_unit_id", false),
            text("reviewer", false),
            text("review_date", false),
            text("comments", false),
        ],
    },
];

/// All registered entity kinds.
#[must_use]
pub fn registry() -> &'static [KindDescriptor] {
    REGISTRY
}

/// Resolve a route segment (`BusinessUnit`, `Projects`, ...) to a descriptor.
/// Matching is case-insensitive; unknown kinds are a routing 404.
#[must_use]
pub fn lookup(kind: &str) -> Option<&'static KindDescriptor> {
    let normalized = kind.trim().to_lowercase();
    REGISTRY
        .iter()
        .find(|descriptor| descriptor.aliases.contains(&normalized.as_str()))
}

/// Roles whose ownership is scoped by business unit rather than authorship.
#[must_use]
pub fn bu_scoped(role: Role) -> bool {
    matches!(
        role,
        Role::BuHead | Role::DeliveryManager | Role::ProjectManager | Role::HrManager
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn kinds_and_tables_are_unique() {
        let mut kinds = HashSet::new();
        let mut tables = HashSet::new();
        for descriptor in registry() {
            assert!(kinds.insert(descriptor.kind), "duplicate kind");
            assert!(tables.insert(descriptor.table), "duplicate table");
        }
    }

    #[test]
    fn aliases_are_unique_across_kinds() {
        let mut seen = HashSet::new();
        for descriptor in registry() {
            for alias in descriptor.aliases {
                assert!(seen.insert(*alias), "alias {alias} registered twice");
            }
        }
    }

    #[test]
    fn id_fields_appear_in_field_list() {
        for descriptor in registry() {
            assert!(
                descriptor.field(descriptor.id_field).is_some(),
                "{} id field missing from fields",
                descriptor.kind
            );
        }
    }

    #[test]
    fn owner_fields_appear_in_field_list() {
        for descriptor in registry() {
            if let Some(owner) = descriptor.owner_bu_field {
                assert!(descriptor.field(owner).is_some());
            }
            if let Some(owner) = descriptor.owner_actor_field {
                assert!(descriptor.field(owner).is_some());
            }
        }
    }

    #[test]
    fn parent_refs_resolve_to_registered_kinds() {
        for descriptor in registry() {
            for parent in descriptor.parents {
                assert!(
                    registry().iter().any(|other| other.kind == parent.kind),
                    "{}: parent kind {} not registered",
                    descriptor.kind,
                    parent.kind
                );
                assert!(
                    descriptor.field(parent.field).is_some(),
                    "{}: parent field {} not declared",
                    descriptor.kind,
                    parent.field
                );
            }
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("BusinessUnit").map(|d| d.kind), Some("BusinessUnit"));
        assert_eq!(lookup("businessunits").map(|d| d.kind), Some("BusinessUnit"));
        assert_eq!(lookup("Projects").map(|d| d.kind), Some("Project"));
        assert_eq!(lookup("TASKS").map(|d| d.kind), Some("Task"));
        assert!(lookup("Unknown").is_none());
    }

    #[test]
    fn master_data_is_never_team_creatable() {
        for descriptor in registry() {
            if descriptor.class == KindClass::MasterData {
                assert!(!descriptor.team_creatable, "{}", descriptor.kind);
            }
        }
    }
}
