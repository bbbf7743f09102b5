//! Access control entries as stored in speclets and attached to operations.

use serde::{Deserialize, Serialize};

/// Whether an entry grants or revokes its permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    Allow,
    Deny,
}

/// A single permission understood by the namespace and the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    Use,
    Administer,
    Create,
    Remove,
    Manage,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Use => "use",
            Self::Administer => "administer",
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Manage => "manage",
        }
    }
}

/// One access control entry: `action` applies `permissions` to `subjects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub action: SecurityAction,
    pub subjects: Vec<String>,
    pub permissions: Vec<Permission>,
}

impl AclEntry {
    pub fn allow(subjects: &[&str], permissions: &[Permission]) -> Self {
        Self {
            action: SecurityAction::Allow,
            subjects: subjects.iter().map(|s| (*s).to_string()).collect(),
            permissions: permissions.to_vec(),
        }
    }

    pub fn deny(subjects: &[&str], permissions: &[Permission]) -> Self {
        Self {
            action: SecurityAction::Deny,
            subjects: subjects.iter().map(|s| (*s).to_string()).collect(),
            permissions: permissions.to_vec(),
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_entry_serde_names() {
        let entry = AclEntry::allow(&["alice", "analysts"], &[Permission::Use, Permission::Read]);
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["action"], "allow");
        assert_eq!(json["subjects"][1], "analysts");
        assert_eq!(json["permissions"][0], "use");
    }

    #[test]
    fn test_unknown_permission_rejected() {
        let raw = r#"{"action": "allow", "subjects": ["bob"], "permissions": ["fly"]}"#;
        assert!(serde_json::from_str::<AclEntry>(raw).is_err());
    }
}
