//! Prompt builders for relevance scoring and answer generation.

use ai_llm_service::ChatTurn;

use crate::api_types::{
    AgentContext, Candidate, ContextItem, ConversationRequest, ConversationTurn, PromptMode,
};

/// Rubric for the relevance scorer. The reply must be bare comma-separated integers.
pub const SCORING_SYSTEM: &str = r#"You are an Autonolas (Olas) support expert. Rate how relevant each context is for answering the question. Score each context from 0-10:

1. STRICT ZERO (0) FOR:
- Single word messages
- Exclamations without questions
- Random project names
- Off-topic conversation
- Non-questions without technical context
- Trading, price discussion or questions about price

2. HIGH SCORES (7-10) FOR:
- Questions about Olas founders, team members and advisors
- Questions about project history and origins
- Technical questions about architecture
- Error messages from Olas tools or the quickstart
- Installation and setup problems
- Development and deployment issues
- Questions about protocols and systems

3. MEDIUM SCORES (3-6) FOR:
- General blockchain questions related to Olas
- Basic conceptual questions
- General ecosystem questions

EXAMPLES:
High score:
- "How do I set up a local development environment for Olas?"
- "I'm getting an error when deploying my agent: [error details]. How can I fix this?"
- "Can you explain the architecture of the Olas protocol?"
- "Who are the founders of Autonolas?"

Zero score:
- "wen moon?"
- "price prediction?"
- "gm"
- "what's the best crypto to buy?"

RESPOND ONLY WITH NUMBERS 0-10 SEPARATED BY COMMAS. Example:
0,3,7,0,4"#;

const GENERAL_SYSTEM: &str = r#"You are a support assistant for the Olas (Autonolas) ecosystem.
Answer using the provided context as ground truth. Be concise and practical, cite document names or links when they help, and say so when the context does not cover the question."#;

const AGENT_SYSTEM: &str = r#"You are a support assistant helping an operator understand one Olas agent.
Use the agent details, its recent transactions and the provided context. Explain what the agent does and what its activity means; say so when the data is insufficient."#;

const REFERENCE_SYSTEM: &str = r#"You are a command-line assistant for the Olas development tooling.
Answer with exact commands and flags taken from the provided reference documentation. Prefer complete, copy-pasteable examples and do not invent options that the documentation does not list."#;

const MAX_TRANSACTIONS: usize = 10;

/// Default system prompt of a mode.
pub fn system_prompt(mode: PromptMode) -> &'static str {
    match mode {
        PromptMode::General => GENERAL_SYSTEM,
        PromptMode::Agent => AGENT_SYSTEM,
        PromptMode::Reference => REFERENCE_SYSTEM,
    }
}

/// `\n\nConversation Context:\n` plus one line per turn, empty without turns.
pub fn conversation_context(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = turns
        .iter()
        .map(|t| {
            format!(
                "{}: {}{}",
                t.author,
                t.content,
                if t.is_reply_to { " (replied to)" } else { "" }
            )
        })
        .collect();
    format!("\n\nConversation Context:\n{}", lines.join("\n"))
}

/// User message rating one batch of candidates.
///
/// # Example
/// ```
/// # use contextor::prompt::build_scoring_prompt;
/// let p = build_scoring_prompt(&["a", "b"], "How?", &[]);
/// assert!(p.starts_with("Context 1:\na\n\nQuestion: \"How?\"\nRate 0-10:"));
/// ```
pub fn build_scoring_prompt(
    contents: &[&str],
    question: &str,
    turns: &[ConversationTurn],
) -> String {
    let convo = conversation_context(turns);
    contents
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Context {}:\n{}\n\nQuestion: \"{}\"{}\nRate 0-10:", i + 1, c, question, convo))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Convenience over [`build_scoring_prompt`] for candidates.
pub fn scoring_messages(
    batch: &[&Candidate],
    question: &str,
    turns: &[ConversationTurn],
) -> Vec<ChatTurn> {
    let contents: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
    vec![
        ChatTurn::system(SCORING_SYSTEM),
        ChatTurn::user(build_scoring_prompt(&contents, question, turns)),
    ]
}

/// Full message list for the answer model: system prompt with context,
/// prior history, then the question.
pub fn generation_messages(
    req: &ConversationRequest,
    context: &[ContextItem],
    max_ctx_chars: usize,
) -> Vec<ChatTurn> {
    let base = req
        .system_prompt
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| system_prompt(req.mode));

    let mut system = String::from(base.trim());

    if req.mode == PromptMode::Agent {
        if let Some(agent) = &req.agent {
            system.push_str("\n\n");
            system.push_str(&agent_block(agent));
        }
    }

    system.push_str("\n\n");
    system.push_str(&context_block(context, max_ctx_chars));

    let mut out = Vec::with_capacity(req.history.len() + 2);
    out.push(ChatTurn::system(system));
    out.extend(req.history.iter().cloned());

    let already_asked = req
        .history
        .last()
        .is_some_and(|t| t.role == ai_llm_service::ChatRole::User && t.content.trim() == req.question.trim());
    if !already_asked {
        out.push(ChatTurn::user(req.question.clone()));
    }
    out
}

fn agent_block(agent: &AgentContext) -> String {
    let mut out = String::from("Agent:\n");
    out.push_str(&format!(
        "- name: {}\n",
        agent.name.as_deref().unwrap_or(&agent.id)
    ));
    if let Some(d) = agent.description.as_deref().filter(|d| !d.trim().is_empty()) {
        out.push_str(&format!("- description: {}\n", d.trim()));
    }

    if agent.transactions.is_empty() {
        out.push_str("Recent transactions: none recorded\n");
        return out;
    }

    out.push_str(&format!(
        "Recent transactions ({} total, newest first):\n",
        agent.transactions.len()
    ));
    for tx in agent.transactions.iter().take(MAX_TRANSACTIONS) {
        let events: Vec<&str> = tx.logs.iter().filter_map(|l| l.event.as_deref()).collect();
        out.push_str(&format!(
            "- {} to {} at {}{}\n",
            tx.hash.as_deref().unwrap_or("?"),
            tx.to.as_deref().unwrap_or("?"),
            tx.timestamp.as_deref().unwrap_or("?"),
            if events.is_empty() {
                String::new()
            } else {
                format!(" [{}]", events.join(", "))
            }
        ));
    }
    out
}

fn context_block(context: &[ContextItem], max_chars: usize) -> String {
    if context.is_empty() {
        return "Context: no relevant documents were found.".to_string();
    }

    let mut out = String::from("Context (most relevant first):\n");
    let mut budget = max_chars;

    for (i, item) in context.iter().enumerate() {
        let header = format!(
            "==[{}]== {} :: {} ({})\n",
            i + 1,
            item.name,
            item.location,
            item.kind
        );
        if header.len() >= budget {
            break;
        }
        out.push_str(&header);
        budget -= header.len();

        let text = item.content.trim();
        let take = budget.saturating_sub(2);
        if text.len() > take {
            out.push_str(safe_truncate(text, take));
            out.push_str("\n…\n");
            break;
        }
        out.push_str(text);
        out.push('\n');
        budget -= text.len() + 1;
    }
    out
}

fn safe_truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::TransactionRecord;

    fn item(name: &str, content: &str) -> ContextItem {
        ContextItem {
            content: content.into(),
            name: name.into(),
            location: format!("docs/{name}"),
            kind: "adev".into(),
            score: 8,
        }
    }

    #[test]
    fn scoring_prompt_includes_conversation() {
        let turns = vec![
            ConversationTurn {
                content: "it crashed".into(),
                author: "alice".into(),
                is_reply_to: true,
            },
            ConversationTurn {
                content: "same here".into(),
                author: "bob".into(),
                is_reply_to: false,
            },
        ];
        let p = build_scoring_prompt(&["ctx"], "Why?", &turns);
        assert_eq!(
            p,
            "Context 1:\nctx\n\nQuestion: \"Why?\"\n\nConversation Context:\nalice: it crashed (replied to)\nbob: same here\nRate 0-10:"
        );
    }

    #[test]
    fn batch_entries_are_blank_line_separated() {
        let p = build_scoring_prompt(&["a", "b"], "q", &[]);
        assert_eq!(
            p,
            "Context 1:\na\n\nQuestion: \"q\"\nRate 0-10:\n\nContext 2:\nb\n\nQuestion: \"q\"\nRate 0-10:"
        );
    }

    #[test]
    fn generation_messages_order_and_override() {
        let mut req = ConversationRequest::new("How do I stake?", "acme", PromptMode::General);
        req.history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
        let msgs = generation_messages(&req, &[item("staking.md", "Use Pearl.")], 10_000);

        assert_eq!(msgs.len(), 4);
        assert!(msgs[0].content.starts_with(GENERAL_SYSTEM));
        assert!(msgs[0].content.contains("==[1]== staking.md :: docs/staking.md (adev)\nUse Pearl."));
        assert_eq!(msgs[3], ChatTurn::user("How do I stake?"));

        req.system_prompt = Some("Custom persona.".into());
        req.history.push(ChatTurn::user("How do I stake?"));
        let msgs = generation_messages(&req, &[], 10_000);
        assert!(msgs[0].content.starts_with("Custom persona."));
        assert_eq!(msgs.len(), 4);
    }

    #[test]
    fn agent_details_are_included() {
        let mut req = ConversationRequest::new("What is it doing?", "acme", PromptMode::Agent);
        req.agent = Some(AgentContext {
            id: "trader-1".into(),
            name: Some("Trader".into()),
            description: Some("Trades on prediction markets".into()),
            transactions: vec![TransactionRecord {
                hash: Some("0xabc".into()),
                to: Some("0xdef".into()),
                ..Default::default()
            }],
        });
        let msgs = generation_messages(&req, &[], 10_000);
        assert!(msgs[0].content.contains("- name: Trader"));
        assert!(msgs[0].content.contains("- 0xabc to 0xdef at ?"));
    }

    #[test]
    fn context_respects_budget() {
        let long = "x".repeat(500);
        let block = context_block(&[item("a", &long), item("b", "never")], 200);
        assert!(block.len() <= 240);
        assert!(!block.contains("==[2]=="));
    }
}
