//! Text context assembled for an agent's decision prompt.

use std::collections::HashMap;
use tracing::debug;

use crate::prompts::{vars, PromptVars};
use crate::tools::FunctionDeclaration;
use crate::types::*;

/// First-person summary of the agent's situation this cycle.
pub fn perceive(state: &AgentState) -> String {
    let agent = &state.agent;
    let mood = match agent.morale {
        m if m >= 0.7 => "upbeat",
        m if m >= 0.4 => "steady",
        _ => "discouraged",
    };

    let mut text = format!(
        "Woken by {} at {}. Feeling {} (morale {:.2}).",
        state.scope.schedule,
        state.scope.triggered_at.format("%Y-%m-%d %H:%M UTC"),
        mood,
        agent.morale,
    );
    if let Some(community) = &agent.community_id {
        text.push_str(&format!(" Home community: {}.", community));
    }
    text.push_str(&format!(
        " {} actions left today, heat {:.2}.",
        agent.daily_actions_remaining, agent.heat
    ));

    debug!("Perception for {}: {} chars", agent.id, text.len());
    text
}

pub fn render_memories(memories: &[MemoryRecord]) -> String {
    if memories.is_empty() {
        return "(nothing yet)".into();
    }
    memories
        .iter()
        .map(|m| format!("- [{}] {}", m.created_at.format("%m-%d %H:%M"), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strongest feelings first.
pub fn render_relationships(relationships: &HashMap<String, f32>) -> String {
    if relationships.is_empty() {
        return "(no one in particular)".into();
    }
    let mut entries: Vec<(&String, &f32)> = relationships.iter().collect();
    entries.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .map(|(other, affinity)| format!("- {}: {:+.2}", other, affinity))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_tools(declarations: &[FunctionDeclaration]) -> String {
    if declarations.is_empty() {
        return "(none)".into();
    }
    declarations
        .iter()
        .map(|d| format!("- {}: {} input schema: {}", d.name, d.description, d.parameters))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Variables for the decision prompt.
pub fn decision_vars(state: &AgentState, declarations: &[FunctionDeclaration]) -> PromptVars {
    vars([
        ("agent_name", state.agent.name.clone()),
        ("personality", state.agent.personality.to_string()),
        ("perception", state.perception.clone().unwrap_or_default()),
        ("memories", render_memories(&state.memories)),
        ("relationships", render_relationships(&state.relationships)),
        ("tools", render_tools(declarations)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state() -> AgentState {
        AgentState::new(TriggerScope::new(
            ScheduleType::AgentCycle,
            AgentRecord {
                id: "a1".into(),
                name: "Mira".into(),
                is_bot: true,
                active: true,
                community_id: Some("poets".into()),
                personality: Personality::default(),
                morale: 0.8,
                heat: 0.2,
                daily_actions_remaining: 4,
            },
        ))
    }

    #[test]
    fn perception_mentions_budget_and_community() {
        let text = perceive(&state());
        assert!(text.contains("agent_cycle"));
        assert!(text.contains("upbeat"));
        assert!(text.contains("Home community: poets."));
        assert!(text.contains("4 actions left today"));
    }

    #[test]
    fn relationships_sorted_by_strength() {
        let rel = HashMap::from([
            ("b".to_string(), 0.1),
            ("c".to_string(), -0.9),
            ("d".to_string(), 0.5),
        ]);
        assert_eq!(render_relationships(&rel), "- c: -0.90\n- d: +0.50\n- b: +0.10");
    }

    #[test]
    fn decision_vars_cover_the_template() {
        let mut s = state();
        s.memories.push(MemoryRecord {
            id: "m".into(),
            agent_id: "a1".into(),
            content: "joined poets".into(),
            importance: 0.5,
            created_at: Utc::now(),
        });
        let v = decision_vars(&s, &[]);
        assert_eq!(v.len(), 6);
        assert_eq!(v["agent_name"], "Mira");
        assert!(v["memories"].as_str().unwrap().contains("joined poets"));
        assert_eq!(v["tools"], "(none)");
    }
}
