//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline definition
///
/// A named workflow made of actions. The execution order is given by each
/// action's `position`, never by the order the store returns them in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub trigger_id: String,
    pub user_id: i64,
    pub actions: Vec<Action>,
}

/// Highest position across a set of actions
///
/// Positions are not required to be dense, so this is what decides whether
/// a pipeline has stages left, not the number of actions.
pub fn max_position(actions: &[Action]) -> Option<i32> {
    actions.iter().map(|a| a.position).max()
}

/// Actions whose position equals `stage`, in the order given
pub fn actions_at(actions: &[Action], stage: u32) -> impl Iterator<Item = &Action> {
    actions
        .iter()
        .filter(move |a| i64::from(a.position) == i64::from(stage))
}

/// One step of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub pipeline_id: String,
    pub kind: ActionKind,
    /// Raw JSON document, decoded by the handler registered for `kind`
    pub metadata: String,
    pub position: i32,
}

/// Catalog id selecting the handler for an action (e.g. `"email"`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKind(String);

impl ActionKind {
    pub const EMAIL: &'static str = "email";

    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn email() -> Self {
        Self::new(Self::EMAIL)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionKind {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, position: i32) -> Action {
        Action {
            id: id.to_string(),
            pipeline_id: "p1".to_string(),
            kind: ActionKind::email(),
            metadata: "{}".to_string(),
            position,
        }
    }

    #[test]
    fn test_max_position_uses_highest_not_count() {
        let actions = vec![action("a", 0), action("b", 3), action("c", 1)];
        assert_eq!(max_position(&actions), Some(3));
    }

    #[test]
    fn test_max_position_empty() {
        assert_eq!(max_position(&[]), None);
    }

    #[test]
    fn test_actions_at_ignores_storage_order() {
        let actions = vec![action("late", 1), action("early", 0), action("dup", 1)];

        let ids: Vec<_> = actions_at(&actions, 1).map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["late", "dup"]);
        assert_eq!(actions_at(&actions, 2).count(), 0);
        assert_eq!(max_position(&actions), Some(1));
    }

    #[test]
    fn test_negative_positions_never_match() {
        let actions = vec![action("neg", -1)];
        assert_eq!(actions_at(&actions, 0).count(), 0);
    }

    #[test]
    fn test_action_kind_display() {
        assert_eq!(ActionKind::email().to_string(), "email");
        assert_eq!(ActionKind::from("webhook").as_str(), "webhook");
    }
}
