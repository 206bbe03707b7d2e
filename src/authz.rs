//! Project roles and the capability matrix gating every mutation.
//!
//! The matrix is the single source of truth: one row per role, one column
//! per action. Route handlers resolve the acting user's membership first
//! ([`require_membership`]), then check the capability
//! ([`require_capability`]). Absence of membership is itself a rejection.

use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ProjectMember;
use crate::schema::project_members;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectRole {
    Attorney,
    Analyst,
    MainProductionContact,
    ProductionAssistant,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectAction {
    Upload,
    EditFinding,
    Finalize,
    RenameVersion,
    DeleteScript,
    DeleteProject,
    ManageMembers,
    AddViewer,
}

/// Capability matrix, roles × actions. Column order matches
/// [`ProjectAction::index`]: upload, edit, finalize, rename, delete-script,
/// delete-project, manage-members, add-viewer.
const CAPABILITIES: [[bool; 8]; 5] = [
    // ATTORNEY
    [true, true, true, true, true, true, true, true],
    // ANALYST
    [true, true, false, false, true, false, true, true],
    // MAIN_PRODUCTION_CONTACT
    [true, false, false, true, false, false, false, false],
    // PRODUCTION_ASSISTANT
    [true, false, false, false, false, false, false, false],
    // VIEWER
    [false, false, false, false, false, false, false, false],
];

impl ProjectRole {
    pub const ALL: &'static [ProjectRole] = &[
        ProjectRole::Attorney,
        ProjectRole::Analyst,
        ProjectRole::MainProductionContact,
        ProjectRole::ProductionAssistant,
        ProjectRole::Viewer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectRole::Attorney => "ATTORNEY",
            ProjectRole::Analyst => "ANALYST",
            ProjectRole::MainProductionContact => "MAIN_PRODUCTION_CONTACT",
            ProjectRole::ProductionAssistant => "PRODUCTION_ASSISTANT",
            ProjectRole::Viewer => "VIEWER",
        }
    }

    pub fn from_str_exact(value: &str) -> Option<Self> {
        match value {
            "ATTORNEY" => Some(ProjectRole::Attorney),
            "ANALYST" => Some(ProjectRole::Analyst),
            "MAIN_PRODUCTION_CONTACT" => Some(ProjectRole::MainProductionContact),
            "PRODUCTION_ASSISTANT" => Some(ProjectRole::ProductionAssistant),
            "VIEWER" => Some(ProjectRole::Viewer),
            _ => None,
        }
    }

    pub fn allows(self, action: ProjectAction) -> bool {
        CAPABILITIES[self.index()][action.index()]
    }

    fn index(self) -> usize {
        match self {
            ProjectRole::Attorney => 0,
            ProjectRole::Analyst => 1,
            ProjectRole::MainProductionContact => 2,
            ProjectRole::ProductionAssistant => 3,
            ProjectRole::Viewer => 4,
        }
    }
}

impl std::fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProjectAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectAction::Upload => "upload",
            ProjectAction::EditFinding => "edit findings",
            ProjectAction::Finalize => "finalize",
            ProjectAction::RenameVersion => "rename versions",
            ProjectAction::DeleteScript => "delete scripts",
            ProjectAction::DeleteProject => "delete the project",
            ProjectAction::ManageMembers => "manage members",
            ProjectAction::AddViewer => "add viewers",
        }
    }

    fn index(self) -> usize {
        match self {
            ProjectAction::Upload => 0,
            ProjectAction::EditFinding => 1,
            ProjectAction::Finalize => 2,
            ProjectAction::RenameVersion => 3,
            ProjectAction::DeleteScript => 4,
            ProjectAction::DeleteProject => 5,
            ProjectAction::ManageMembers => 6,
            ProjectAction::AddViewer => 7,
        }
    }
}

impl std::fmt::Display for ProjectAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("user is not a member of this project")]
    NotAMember,
    #[error("role {role} may not {action}")]
    Forbidden {
        action: ProjectAction,
        role: ProjectRole,
    },
    #[error("user is already a member of this project")]
    AlreadyMember,
    #[error("the project creator cannot be removed")]
    CannotRemoveCreator,
}

impl From<AuthzError> for AppError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::NotAMember | AuthzError::Forbidden { .. } => {
                AppError::forbidden(value.to_string())
            }
            AuthzError::AlreadyMember | AuthzError::CannotRemoveCreator => {
                AppError::conflict(value.to_string())
            }
        }
    }
}

/// Looks up the acting user's membership in a project. Missing membership
/// rejects the whole operation with `NotAMember`.
pub fn require_membership(
    conn: &mut PgConnection,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<(ProjectMember, ProjectRole), AppError> {
    let membership: Option<ProjectMember> = project_members::table
        .filter(project_members::project_id.eq(project_id))
        .filter(project_members::user_id.eq(user_id))
        .first(conn)
        .optional()?;

    let membership = membership.ok_or(AuthzError::NotAMember)?;
    let role = ProjectRole::from_str_exact(&membership.project_role).ok_or_else(|| {
        AppError::internal(format!(
            "unrecognized project role '{}' stored for member {}",
            membership.project_role, membership.id
        ))
    })?;

    Ok((membership, role))
}

pub fn require_capability(role: ProjectRole, action: ProjectAction) -> Result<(), AuthzError> {
    if role.allows(action) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden { action, role })
    }
}

#[cfg(test)]
mod tests {
    use super::ProjectAction::*;
    use super::ProjectRole::*;
    use super::*;

    #[test]
    fn capability_matrix_covers_every_role_action_pair() {
        // (role, action, allowed) for every cell of the matrix.
        let cells = [
            (Attorney, Upload, true),
            (Attorney, EditFinding, true),
            (Attorney, Finalize, true),
            (Attorney, RenameVersion, true),
            (Attorney, DeleteScript, true),
            (Attorney, DeleteProject, true),
            (Attorney, ManageMembers, true),
            (Attorney, AddViewer, true),
            (Analyst, Upload, true),
            (Analyst, EditFinding, true),
            (Analyst, Finalize, false),
            (Analyst, RenameVersion, false),
            (Analyst, DeleteScript, true),
            (Analyst, DeleteProject, false),
            (Analyst, ManageMembers, true),
            (Analyst, AddViewer, true),
            (MainProductionContact, Upload, true),
            (MainProductionContact, EditFinding, false),
            (MainProductionContact, Finalize, false),
            (MainProductionContact, RenameVersion, true),
            (MainProductionContact, DeleteScript, false),
            (MainProductionContact, DeleteProject, false),
            (MainProductionContact, ManageMembers, false),
            (MainProductionContact, AddViewer, false),
            (ProductionAssistant, Upload, true),
            (ProductionAssistant, EditFinding, false),
            (ProductionAssistant, Finalize, false),
            (ProductionAssistant, RenameVersion, false),
            (ProductionAssistant, DeleteScript, false),
            (ProductionAssistant, DeleteProject, false),
            (ProductionAssistant, ManageMembers, false),
            (ProductionAssistant, AddViewer, false),
            (Viewer, Upload, false),
            (Viewer, EditFinding, false),
            (Viewer, Finalize, false),
            (Viewer, RenameVersion, false),
            (Viewer, DeleteScript, false),
            (Viewer, DeleteProject, false),
            (Viewer, ManageMembers, false),
            (Viewer, AddViewer, false),
        ];
        assert_eq!(cells.len(), 40);

        for (role, action, allowed) in cells {
            assert_eq!(
                role.allows(action),
                allowed,
                "{role} / {action} should be {allowed}"
            );
        }
    }

    #[test]
    fn require_capability_reports_role_and_action() {
        let err = require_capability(Viewer, Upload).unwrap_err();
        assert_eq!(
            err,
            AuthzError::Forbidden {
                action: Upload,
                role: Viewer
            }
        );
    }

    #[test]
    fn role_names_round_trip_through_storage_form() {
        for role in ProjectRole::ALL {
            assert_eq!(ProjectRole::from_str_exact(role.as_str()), Some(*role));
        }
    }
}
