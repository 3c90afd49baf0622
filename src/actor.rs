//! Acting-user identity threaded through ledger operations
//!
//! Internal maintenance runs under an explicit system actor instead of a
//! well-known user row.

use serde::{Deserialize, Serialize};

/// The user (or system process) performing a staged operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier, stored on changes and change groups
    pub id: String,
    /// Display name used in change descriptions
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// System actor for internal maintenance commits
    pub fn system(name: &str) -> Self {
        Self {
            id: format!("system:{}", name),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_actor() {
        let actor = Actor::system("migration");
        assert_eq!(actor.id, "system:migration");
        assert_eq!(actor.name, "migration");
    }
}
