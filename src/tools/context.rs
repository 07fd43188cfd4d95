//! Execution context passed alongside every tool call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What kind of entity the current interaction is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Post,
    Comment,
    User,
    Community,
    Proposal,
}

/// Actor and session metadata used to normalize tool input.
///
/// The registry reads this; it never stores it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolContext {
    /// The acting user or agent.
    pub user_id: Option<String>,
    /// The entity being acted upon.
    pub subject_id: Option<String>,
    pub subject_kind: Option<SubjectKind>,
    /// The acting user's own post, when the interaction concerns one.
    pub post_id: Option<String>,
    pub community_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ToolContext {
    pub fn for_actor(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_subject(mut self, kind: SubjectKind, id: impl Into<String>) -> Self {
        self.subject_kind = Some(kind);
        self.subject_id = Some(id.into());
        self
    }

    pub fn with_post(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    pub fn with_community(mut self, community_id: impl Into<String>) -> Self {
        self.community_id = Some(community_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A present, non-empty value.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
