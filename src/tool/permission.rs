//! Permission sets, agent identities, and the per-agent allow-list checker.
//!
//! Permissions are opaque strings compared for exact equality. There are no
//! wildcards and no hierarchy: `docs:read` does not imply `docs:*`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// An ordered set of permission names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a permission.
    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    /// Remove a permission.
    pub fn remove(&mut self, permission: &str) -> bool {
        self.0.remove(permission)
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Permissions in `self` that `granted` does not hold, in sorted order.
    ///
    /// Empty iff `self ⊆ granted`.
    pub fn missing_from(&self, granted: &PermissionSet) -> Vec<String> {
        self.0.difference(&granted.0).cloned().collect()
    }

    pub fn is_subset(&self, other: &PermissionSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// The caller context passed into every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub name: String,
    pub permissions: PermissionSet,
}

impl AgentIdentity {
    pub fn new(name: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            name: name.into(),
            permissions,
        }
    }
}

/// Per-agent permission allow-lists, consumed once at run setup.
#[derive(Debug, Clone, Default)]
pub struct PermissionChecker {
    agents: HashMap<String, PermissionSet>,
}

impl PermissionChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a checker from an `agent → permissions` allow-list.
    pub fn from_allow_list<I, P>(allow_list: I) -> Self
    where
        I: IntoIterator<Item = (String, P)>,
        P: IntoIterator<Item = String>,
    {
        let agents = allow_list
            .into_iter()
            .map(|(agent, perms)| (agent, perms.into_iter().collect()))
            .collect();
        Self { agents }
    }

    /// Grant a set of permissions to an agent, replacing any previous grant.
    pub fn grant(&mut self, agent: impl Into<String>, permissions: PermissionSet) {
        self.agents.insert(agent.into(), permissions);
    }

    /// Identity for an agent. Unknown agents get an empty permission set.
    pub fn identity(&self, agent: &str) -> AgentIdentity {
        AgentIdentity::new(agent, self.agents.get(agent).cloned().unwrap_or_default())
    }

    /// Whether `agent` holds every permission in `required`.
    pub fn check(&self, agent: &str, required: &PermissionSet) -> bool {
        self.agents
            .get(agent)
            .is_some_and(|granted| required.is_subset(granted))
            || required.is_empty()
    }

    /// Fail with [`RegistryError::PermissionDenied`] when `agent` lacks any of
    /// the permissions `tool` requires.
    pub fn enforce(&self, agent: &str, tool: &str, required: &PermissionSet) -> RegistryResult<()> {
        let granted = self.agents.get(agent).cloned().unwrap_or_default();
        let missing = required.missing_from(&granted);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::PermissionDenied {
                tool: tool.into(),
                agent: agent.into(),
                missing,
            })
        }
    }

    /// Names of all configured agents, sorted.
    pub fn agents(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(perms: &[&str]) -> PermissionSet {
        perms.iter().copied().collect()
    }

    #[test]
    fn missing_is_sorted_difference() {
        let required = set(&["tasks:write", "docs:read", "tasks:read"]);
        let granted = set(&["tasks:read"]);
        assert_eq!(required.missing_from(&granted), vec!["docs:read", "tasks:write"]);
        assert!(required.missing_from(&required).is_empty());
    }

    #[test]
    fn exact_equality_only() {
        let required = set(&["docs:read"]);
        assert!(!required.is_subset(&set(&["docs:*"])));
        assert!(!required.is_subset(&set(&["DOCS:READ"])));
        assert!(!required.is_subset(&set(&["docs"])));
    }

    #[test]
    fn checker_unknown_agent_has_nothing() {
        let checker = PermissionChecker::from_allow_list([(
            "reviewer".to_string(),
            vec!["pr:read".to_string()],
        )]);
        assert!(checker.identity("ghost").permissions.is_empty());
        assert!(!checker.check("ghost", &set(&["pr:read"])));
        assert!(checker.check("ghost", &PermissionSet::new()));
        assert!(checker.check("reviewer", &set(&["pr:read"])));
    }

    #[test]
    fn enforce_reports_missing() {
        let mut checker = PermissionChecker::new();
        checker.grant("support", set(&["crm:read"]));
        let err = checker
            .enforce("support", "crm.update", &set(&["crm:read", "crm:write"]))
            .unwrap_err();
        match err {
            RegistryError::PermissionDenied { missing, agent, .. } => {
                assert_eq!(missing, vec!["crm:write"]);
                assert_eq!(agent, "support");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn permission_set_serializes_as_array() {
        let json = serde_json::to_string(&set(&["b", "a"])).unwrap();
        assert_eq!(json, r#"["a","b"]"#);
    }
}
