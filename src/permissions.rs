use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

pub trait PermissionOracle: Send + Sync {
    fn can_view(&self, module: &str, section: &str) -> bool;
    fn can_edit(&self, module: &str, section: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("access to {module}/{section} denied")]
pub struct AccessDenied {
    pub module: String,
    pub section: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    View,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Grant {
    pub module: String,
    pub section: String,
    pub access: Access,
}

#[derive(Debug, Clone, Default)]
pub struct GrantTable {
    grants: BTreeSet<(String, String, Access)>,
    allow_all: bool,
}

impl GrantTable {
    pub fn new(grants: &[Grant]) -> Self {
        Self {
            grants: grants
                .iter()
                .map(|grant| (grant.module.clone(), grant.section.clone(), grant.access))
                .collect(),
            allow_all: false,
        }
    }

    pub fn allow_all() -> Self {
        Self {
            grants: BTreeSet::new(),
            allow_all: true,
        }
    }

    fn has(&self, module: &str, section: &str, access: Access) -> bool {
        if self.allow_all {
            return true;
        }
        self.grants.iter().any(|(m, s, granted)| {
            m == module && (s == section || s == "*") && *granted >= access
        })
    }
}

impl PermissionOracle for GrantTable {
    fn can_view(&self, module: &str, section: &str) -> bool {
        self.has(module, section, Access::View)
    }

    fn can_edit(&self, module: &str, section: &str) -> bool {
        self.has(module, section, Access::Edit)
    }
}

pub fn navigable_sections<'a>(
    oracle: &dyn PermissionOracle,
    module: &str,
    sections: &[&'a str],
) -> Vec<&'a str> {
    sections
        .iter()
        .copied()
        .filter(|section| oracle.can_view(module, section))
        .collect()
}

/// Checked again right before guarded content renders, so a section reached
/// without going through navigation is still refused.
pub fn guard_view(
    oracle: &dyn PermissionOracle,
    module: &str,
    section: &str,
) -> Result<(), AccessDenied> {
    if oracle.can_view(module, section) {
        Ok(())
    } else {
        Err(denied(module, section))
    }
}

pub fn guard_edit(
    oracle: &dyn PermissionOracle,
    module: &str,
    section: &str,
) -> Result<(), AccessDenied> {
    if oracle.can_view(module, section) && oracle.can_edit(module, section) {
        Ok(())
    } else {
        Err(denied(module, section))
    }
}

fn denied(module: &str, section: &str) -> AccessDenied {
    tracing::warn!(module, section, "access denied");
    AccessDenied {
        module: module.to_string(),
        section: section.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(module: &str, section: &str, access: Access) -> Grant {
        Grant {
            module: module.to_string(),
            section: section.to_string(),
            access,
        }
    }

    #[test]
    fn edit_implies_view_and_wildcard_covers_module() {
        let table = GrantTable::new(&[
            grant("expenses", "approvals", Access::Edit),
            grant("performance", "*", Access::View),
        ]);
        assert!(table.can_view("expenses", "approvals"));
        assert!(table.can_edit("expenses", "approvals"));
        assert!(!table.can_view("expenses", "billing"));
        assert!(table.can_view("performance", "goals"));
        assert!(!table.can_edit("performance", "goals"));
    }

    #[test]
    fn hidden_sections_are_dropped_from_navigation() {
        let table = GrantTable::new(&[grant("expenses", "archive", Access::View)]);
        let visible = navigable_sections(&table, "expenses", &["approvals", "archive", "cards"]);
        assert_eq!(visible, vec!["archive"]);
    }

    #[test]
    fn guards_refuse_direct_access() {
        let table = GrantTable::new(&[grant("performance", "goals", Access::View)]);
        assert!(guard_view(&table, "performance", "goals").is_ok());
        assert!(guard_edit(&table, "performance", "goals").is_err());
        let err = guard_view(&table, "performance", "insights").unwrap_err();
        assert_eq!(err.section, "insights");
        assert!(guard_edit(&GrantTable::allow_all(), "expenses", "policies").is_ok());
    }
}
