//! Role assignment models
//!
//! The same shape serves both the host-editable pending map and the
//! committed per-player active assignment.

use serde::{Deserialize, Serialize};

/// One filled attachment selection on an assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAttachment {
    pub slot: String,
    pub index: usize,
    pub role_id: String,
}

/// A seat's primary role plus its attachment selections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub role_id: String,
    pub attachments: Vec<RoleAttachment>,
}

impl RoleAssignment {
    pub fn new(role_id: impl Into<String>) -> Self {
        Self {
            role_id: role_id.into(),
            attachments: Vec::new(),
        }
    }

    pub fn attachment(&self, slot: &str, index: usize) -> Option<&RoleAttachment> {
        self.attachments
            .iter()
            .find(|att| att.slot == slot && att.index == index)
    }

    /// Insert or replace the selection at (slot, index), keeping the list
    /// sorted by (slot, index).
    pub fn set_attachment(&mut self, slot: impl Into<String>, index: usize, role_id: impl Into<String>) {
        let slot = slot.into();
        let role_id = role_id.into();
        self.attachments
            .retain(|att| !(att.slot == slot && att.index == index));
        self.attachments.push(RoleAttachment { slot, index, role_id });
        self.sort_attachments();
    }

    pub fn sort_attachments(&mut self) {
        self.attachments
            .sort_by(|a, b| (&a.slot, a.index).cmp(&(&b.slot, b.index)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attachment_replaces_same_position() {
        let mut assignment = RoleAssignment::new("imp");
        assignment.set_attachment("demon_bluff", 0, "chef");
        assignment.set_attachment("demon_bluff", 0, "empath");
        assert_eq!(assignment.attachments.len(), 1);
        assert_eq!(assignment.attachment("demon_bluff", 0).unwrap().role_id, "empath");
    }

    #[test]
    fn test_attachments_stay_sorted() {
        let mut assignment = RoleAssignment::new("imp");
        assignment.set_attachment("demon_bluff", 2, "c");
        assignment.set_attachment("demon_bluff", 0, "a");
        assignment.set_attachment("alt_slot", 1, "b");
        let order: Vec<(String, usize)> = assignment
            .attachments
            .iter()
            .map(|att| (att.slot.clone(), att.index))
            .collect();
        assert_eq!(
            order,
            vec![
                ("alt_slot".to_string(), 1),
                ("demon_bluff".to_string(), 0),
                ("demon_bluff".to_string(), 2),
            ]
        );
    }
}
