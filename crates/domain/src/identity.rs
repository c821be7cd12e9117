//! Caller identity and workspace roles.
//!
//! Authentication and workspace membership live outside the execution core;
//! what arrives here is an already-resolved identity plus, for workspace
//! graphs, the caller's role in that workspace.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The authenticated caller, as resolved by the outer auth layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    #[serde(default)]
    pub is_superuser: bool,
    /// Role in the workspace owning the resource under access, when known.
    #[serde(default)]
    pub workspace_role: Option<WorkspaceRole>,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_superuser: false,
            workspace_role: None,
        }
    }

    pub fn with_role(mut self, role: WorkspaceRole) -> Self {
        self.workspace_role = Some(role);
        self
    }
}

/// Workspace member roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    Viewer,
    Editor,
    Admin,
}

impl WorkspaceRole {
    pub fn at_least(self, required: WorkspaceRole) -> bool {
        self >= required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering() {
        assert!(WorkspaceRole::Admin.at_least(WorkspaceRole::Viewer));
        assert!(WorkspaceRole::Editor.at_least(WorkspaceRole::Viewer));
        assert!(!WorkspaceRole::Viewer.at_least(WorkspaceRole::Admin));
        assert!(WorkspaceRole::Viewer.at_least(WorkspaceRole::Viewer));
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&WorkspaceRole::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }
}
