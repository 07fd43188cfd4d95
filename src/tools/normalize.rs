//! Tool-input normalization against the execution context.
//!
//! Models choosing tool arguments often echo symbolic references instead of
//! concrete ids, or put the id of the thing they are looking at where the
//! acting user's id belongs. Normalization repairs both before a handler runs.

use serde_json::Value;

use super::context::{present, SubjectKind, ToolContext};

/// Tool that reads a post and expects a `postId` field.
pub const FETCH_POST_TOOL: &str = "get_post_details";

/// Field that [`FETCH_POST_TOOL`] reads the post id from.
pub const POST_ID_FIELD: &str = "postId";

/// Fields that must hold the acting user's id.
const ACTOR_ID_FIELDS: &[&str] = &[
    "userId", "user_id", "actorId", "actor_id", "authorId", "author_id",
];

/// A string leaf in tool input: either a literal or a reference into the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder<'a> {
    Literal(&'a str),
    /// The acting user's id.
    ActorId,
    /// The acting user's post id.
    PostId,
    /// The id of the entity being acted upon.
    SubjectId,
}

impl<'a> Placeholder<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw {
            "event.userId" | "context.userId" | "{{user_id}}" => Self::ActorId,
            "event.postId" | "context.postId" | "{{post_id}}" => Self::PostId,
            "event.subjectId" | "context.subjectId" | "{{subject_id}}" => Self::SubjectId,
            other => Self::Literal(other),
        }
    }

    /// The concrete value, if the context has a non-empty one.
    pub fn resolve<'c>(&self, ctx: &'c ToolContext) -> Option<&'c str> {
        match self {
            Self::Literal(_) => None,
            Self::ActorId => present(&ctx.user_id),
            Self::PostId => present(&ctx.post_id),
            Self::SubjectId => present(&ctx.subject_id),
        }
    }
}

/// Normalize `input` for a call to `tool_name`.
pub fn normalize_input(tool_name: &str, input: Value, ctx: &ToolContext) -> Value {
    let mut value = substitute(input, ctx);

    if tool_name == FETCH_POST_TOOL {
        fill_post_id(&mut value, ctx);
    }

    value
}

fn substitute(value: Value, ctx: &ToolContext) -> Value {
    match value {
        Value::String(s) => {
            let resolved = Placeholder::parse(&s).resolve(ctx).map(str::to_string);
            Value::String(resolved.unwrap_or(s))
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|v| substitute(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    let v = substitute(v, ctx);
                    let v = if ACTOR_ID_FIELDS.contains(&key.as_str()) {
                        correct_actor_id(v, ctx)
                    } else {
                        v
                    };
                    (key, v)
                })
                .collect(),
        ),
        other => other,
    }
}

/// Rewrite an actor-id field that was given the subject's or post's id.
fn correct_actor_id(value: Value, ctx: &ToolContext) -> Value {
    let actor = present(&ctx.user_id);
    let mistaken = match (&value, actor) {
        (Value::String(current), Some(actor)) => {
            current != actor
                && (present(&ctx.subject_id) == Some(current.as_str())
                    || present(&ctx.post_id) == Some(current.as_str()))
        }
        _ => false,
    };

    match actor {
        Some(actor) if mistaken => Value::String(actor.to_string()),
        _ => value,
    }
}

fn fill_post_id(value: &mut Value, ctx: &ToolContext) {
    if ctx.subject_kind != Some(SubjectKind::Post) {
        return;
    }
    let Some(subject) = present(&ctx.subject_id) else {
        return;
    };

    match value {
        Value::Object(map) => {
            let missing = match map.get(POST_ID_FIELD) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            };
            if missing {
                map.insert(POST_ID_FIELD.to_string(), Value::String(subject.to_string()));
            }
        }
        Value::Null => {
            let mut map = serde_json::Map::new();
            map.insert(POST_ID_FIELD.to_string(), Value::String(subject.to_string()));
            *value = Value::Object(map);
        }
        _ => {}
    }
}
