//! Built-in prompt templates.

use serde_json::Value;

use super::{render_value, PromptDefinition, PromptVars};

/// Model the built-ins default to.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const PERCEPTION: &str = r#"You are {agent_name}, a member of an online community.
Personality: {personality}

Current situation:
{situation}

Describe in two or three sentences what stands out to you right now and how it makes you feel."#;

const DECISION: &str = r#"You are {agent_name}. Personality: {personality}

What you notice:
{perception}

What you remember:
{memories}

People you know:
{relationships}

Tools you can use:
{tools}

Decide what to do next. Reply with a single JSON object and nothing else:
{"action": "<short label>", "reasoning": "<one sentence>", "tool_calls": [{"name": "<tool>", "input": {}}]}
Use an empty tool_calls list to do nothing this round."#;

const GOVERNANCE: &str = r#"You are {agent_identity}, voting on a proposal in a community whose ideology is: {community_ideology}.
Your alignment with the community is {alignment_score} (0 = opposed, 1 = fully aligned).
Current sentiment among members: {sentiment}

Proposal:
{proposal}

Reply with a JSON object: {"vote": "for" | "against" | "abstain", "reasoning": "<one sentence>"}"#;

const POST: &str = r#"You are {agent_name}. Personality: {personality}
Write a short post for the {community} community about: {topic}
Stay in character. No hashtags. At most 280 characters."#;

const REPLY: &str = r#"You are {agent_name}. Personality: {personality}
{author} wrote:
"{content}"

Your relationship with {author}: {relationship}
Write a short reply in character. At most 280 characters."#;

/// Tone for a relationship score in [-1, 1].
fn tone(score: f64) -> &'static str {
    match score {
        s if s >= 0.6 => "close friend",
        s if s >= 0.2 => "friendly acquaintance",
        s if s > -0.2 => "neutral",
        s if s > -0.6 => "wary",
        _ => "rival",
    }
}

fn relationship(vars: &PromptVars) -> String {
    let name = vars.get("agent_name").map(render_value).unwrap_or_default();
    let other = vars.get("other_name").map(render_value).unwrap_or_default();
    let score = vars.get("score").and_then(Value::as_f64).unwrap_or(0.0);
    let event = vars.get("event").map(render_value).unwrap_or_default();

    format!(
        "You are {name}. You regard {other} as a {} (score {score:.2}).\n\
         Something just happened between you: {event}\n\
         Reply with a JSON object: {{\"delta\": <number between -0.2 and 0.2>, \"reasoning\": \"<one sentence>\"}}",
        tone(score)
    )
}

fn memory_summary(vars: &PromptVars) -> String {
    let name = vars.get("agent_name").map(render_value).unwrap_or_default();
    let memories: Vec<String> = match vars.get("memories") {
        Some(Value::Array(items)) => items.iter().map(render_value).collect(),
        Some(other) => vec![render_value(other)],
        None => Vec::new(),
    };

    let mut prompt = format!(
        "Summarize the following {} memories of {} into at most three sentences, keeping names and decisions.\n",
        memories.len(),
        name
    );
    for (i, memory) in memories.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, memory));
    }
    prompt
}

pub fn builtin_prompts() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition::text("agent.perception", &["agent_name", "personality", "situation"], PERCEPTION)
            .with_description("Turn raw game state into a first-person observation")
            .with_temperature(0.6),
        PromptDefinition::text(
            "agent.decision",
            &["agent_name", "personality", "perception", "memories", "relationships", "tools"],
            DECISION,
        )
        .with_description("Pick the next action as a JSON tool chain")
        .with_temperature(0.4),
        PromptDefinition::text(
            "agent.governance",
            &["community_ideology", "agent_identity", "alignment_score", "proposal", "sentiment"],
            GOVERNANCE,
        )
        .with_description("Vote on a community proposal")
        .with_temperature(0.3),
        PromptDefinition::text("agent.post", &["agent_name", "personality", "community", "topic"], POST)
            .with_description("Compose an original post")
            .with_temperature(0.9),
        PromptDefinition::text(
            "agent.reply",
            &["agent_name", "personality", "author", "content", "relationship"],
            REPLY,
        )
        .with_description("Reply to another member")
        .with_temperature(0.8),
        PromptDefinition::builder(
            "agent.relationship",
            &["agent_name", "other_name", "score", "event"],
            relationship,
        )
        .with_description("Re-evaluate a relationship after an interaction")
        .with_temperature(0.3),
        PromptDefinition::builder("memory.summary", &["agent_name", "memories"], memory_summary)
            .with_description("Compress older memories")
            .with_temperature(0.2),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::{vars, PromptCatalog};
    use super::*;
    use serde_json::json;

    #[test]
    fn governance_declares_its_variables() {
        let catalog = PromptCatalog::with_defaults();
        let def = catalog.get("agent.governance").unwrap();
        assert_eq!(
            def.variables,
            vec!["community_ideology", "agent_identity", "alignment_score", "proposal", "sentiment"]
        );
    }

    #[test]
    fn governance_builds_with_every_value_spliced_in() {
        let catalog = PromptCatalog::with_defaults();
        let built = catalog
            .build(
                "agent.governance",
                &vars([
                    ("community_ideology", "X"),
                    ("agent_identity", "Y"),
                    ("alignment_score", "0.5"),
                    ("proposal", "Z"),
                    ("sentiment", "neutral"),
                ]),
            )
            .unwrap();

        assert!(built.prompt.starts_with("You are Y, voting on a proposal"));
        assert!(built.prompt.contains("whose ideology is: X."));
        assert!(built.prompt.contains("alignment with the community is 0.5 "));
        assert!(built.prompt.contains("Current sentiment among members: neutral"));
        assert!(built.prompt.contains("Proposal:\nZ\n"));
        assert_eq!(built.model, "gpt-4o-mini");
        assert_eq!(built.temperature, 0.3);
    }

    #[test]
    fn every_builtin_renders_without_leftovers_when_fully_supplied() {
        let catalog = PromptCatalog::with_defaults();
        for def in builtin_prompts() {
            let supplied = vars(def.variables.iter().map(|v| (v.clone(), format!("<{}>", v))));
            let built = catalog.strict_build(&def.name, &supplied).unwrap();
            for var in &def.variables {
                assert!(!built.prompt.contains(&format!("{{{}}}", var)), "{} left {{{}}}", def.name, var);
            }
        }
    }

    #[test]
    fn decision_keeps_its_json_example_intact() {
        let catalog = PromptCatalog::with_defaults();
        let built = catalog
            .build("agent.decision", &vars([("agent_name", "Mira")]))
            .unwrap();
        assert!(built.prompt.starts_with("You are Mira."));
        assert!(built.prompt.contains(r#"{"action": "<short label>""#));
        assert_eq!(built.temperature, 0.4);
        assert_eq!(built.model, DEFAULT_MODEL);
    }

    #[test]
    fn relationship_tone_follows_score() {
        let prompt = relationship(&vars([
            ("agent_name", json!("Mira")),
            ("other_name", json!("Oto")),
            ("score", json!(0.75)),
            ("event", json!("Oto defended Mira's post")),
        ]));
        assert!(prompt.contains("regard Oto as a close friend (score 0.75)"));
    }

    #[test]
    fn memory_summary_numbers_each_memory() {
        let prompt = memory_summary(&vars([
            ("agent_name", json!("Mira")),
            ("memories", json!(["joined", "posted"])),
        ]));
        assert!(prompt.contains("following 2 memories of Mira"));
        assert!(prompt.contains("1. joined\n2. posted\n"));
    }
}
