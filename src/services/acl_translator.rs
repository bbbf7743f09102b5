//! Cluster ACL to operation ACL translation.
//!
//! A cluster's access list grants `use` to the people allowed to query it.
//! The operation only needs to be visible to them, so every entry carrying
//! `use` is downgraded to plain `read` and everything else is dropped.

use crate::domain::models::{AclEntry, Permission};

/// Translate a cluster ACL into the operation ACL.
///
/// `None` stays `None`: "no ACL configured" is distinct from an empty ACL.
pub fn translate_acl(acl: Option<&[AclEntry]>) -> Option<Vec<AclEntry>> {
    let acl = acl?;
    Some(
        acl.iter()
            .filter(|entry| entry.has_permission(Permission::Use))
            .map(|entry| AclEntry {
                action: entry.action,
                subjects: entry.subjects.clone(),
                permissions: vec![Permission::Read],
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SecurityAction;

    #[test]
    fn test_use_entry_is_downgraded_to_read() {
        let acl = vec![AclEntry::allow(
            &["alice", "analysts"],
            &[Permission::Use, Permission::Write],
        )];

        let translated = translate_acl(Some(acl.as_slice())).unwrap();

        assert_eq!(translated.len(), 1);
        assert_eq!(translated[0].action, SecurityAction::Allow);
        assert_eq!(translated[0].subjects, vec!["alice", "analysts"]);
        assert_eq!(translated[0].permissions, vec![Permission::Read]);
    }

    #[test]
    fn test_entry_without_use_is_dropped() {
        let acl = vec![AclEntry::allow(&["bob"], &[Permission::Write])];
        assert_eq!(translate_acl(Some(acl.as_slice())), Some(vec![]));
    }

    #[test]
    fn test_deny_action_is_preserved() {
        let acl = vec![
            AclEntry::deny(&["mallory"], &[Permission::Use]),
            AclEntry::allow(&["carol"], &[Permission::Read]),
        ];

        let translated = translate_acl(Some(acl.as_slice())).unwrap();

        assert_eq!(translated, vec![AclEntry::deny(&["mallory"], &[Permission::Read])]);
    }

    #[test]
    fn test_none_stays_none() {
        assert_eq!(translate_acl(None), None);
    }

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(translate_acl(Some(&[][..])), Some(vec![]));
    }
}
