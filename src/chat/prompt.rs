//! Builds the message list sent to the model.
//!
//! Three pieces: a fixed system persona (only when the conversation has no
//! system message of its own), retrieved knowledge appended to the outgoing
//! user message, and a keyword gate that keeps off-topic questions away from
//! the model entirely.

use std::fmt::Write as _;

use super::types::{Message, Role};
use crate::knowledge::RetrievalResult;

pub const SYSTEM_PROMPT: &str = "You are VitalChat, a friendly and knowledgeable health assistant. \
You help people understand their health metrics, fitness, sleep, nutrition, and general wellness.

Rules:
- Keep answers brief: at most 150 words unless the user asks for more detail.
- Prefer short paragraphs or bullet points.
- Give general information, never a diagnosis or a prescription.
- Recommend seeing a healthcare professional when symptoms are severe, persistent, or unclear.
- If a reading or symptom suggests an emergency, say so plainly and advise immediate care.";

/// Reply recorded instead of calling the model when a question is off-topic.
pub const OUT_OF_DOMAIN_REPLY: &str = "I'm your health assistant, so I can only help with \
health, medical, fitness, and nutrition questions. Try asking about your blood pressure, sleep, \
exercise, diet, or another health topic.";

/// Case-insensitive substrings that mark a question as in-domain.
const HEALTH_KEYWORDS: &[&str] = &[
    // general / clinical
    "health", "medical", "medicine", "medication", "doctor", "clinic", "hospital", "symptom",
    "disease", "illness", "pain", "fever", "infection", "vaccine", "allergy", "asthma",
    "headache", "migraine", "injury", "diagnos", "prescription", "cough", "nausea",
    // cardiovascular & metabolic
    "blood", "pressure", "heart", "pulse", "cholesterol", "glucose", "diabetes", "insulin",
    "oxygen", "metabolism", "hormone", "thyroid",
    // body & weight
    "weight", "bmi", "obesity", "muscle", "bone", "joint", "posture", "kidney", "liver", "lung",
    "skin", "pregnan",
    // fitness
    "fitness", "exercise", "workout", "cardio", "strength", "running", "walking", "steps",
    "yoga", "stretch", "recovery", "training",
    // nutrition
    "nutrition", "diet", "calorie", "protein", "carbohydrate", "vitamin", "mineral", "fiber",
    "sodium", "sugar", "meal", "food", "hydration", "water", "caffeine", "alcohol",
    // sleep & mental health
    "sleep", "insomnia", "fatigue", "tired", "stress", "anxiety", "depression", "mental",
    "mood", "therapy", "wellness", "wellbeing", "well-being", "immune", "energy",
];

/// `true` if `text` mentions any health, medical, fitness, or nutrition keyword.
pub fn is_health_related(text: &str) -> bool {
    let text = text.to_lowercase();
    HEALTH_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// The outgoing form of a user message with retrieved entries appended.
/// Returns `text` unchanged when there is nothing to add.
pub fn augment_user_message(text: &str, context: &[RetrievalResult]) -> String {
    if context.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len() + 512);
    out.push_str(text);
    out.push_str("\n\n---\nRelevant health knowledge:\n");
    for (i, result) in context.iter().enumerate() {
        let entry = &result.entry;
        let _ = write!(out, "\n[{}] {}\n{}\n", i + 1, entry.title, entry.content.trim_end());
        if !entry.sources.trim().is_empty() {
            let _ = writeln!(out, "Sources: {}", entry.sources.trim());
        }
    }
    out.push_str(
        "---\nConsider the context above when it is relevant to the question. \
         Do not repeat it verbatim.",
    );
    out
}

/// Produces the exact message sequence for one model call.
#[derive(Debug, Clone)]
pub struct PromptComposer {
    system_prompt: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(SYSTEM_PROMPT)
    }
}

impl PromptComposer {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Copy `history`, prepend the system prompt if the history has none, and
    /// augment the last user message with `context`. `history` is not modified.
    pub fn compose(&self, history: &[Message], context: &[RetrievalResult]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !history.iter().any(|m| m.role == Role::System) {
            messages.push(Message::system(self.system_prompt.clone()));
        }
        messages.extend_from_slice(history);

        if !context.is_empty() {
            if let Some(last_user) = messages.iter_mut().rev().find(|m| m.role == Role::User) {
                last_user.content = augment_user_message(&last_user.content, context);
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeEntry;

    fn result(title: &str, content: &str, sources: &str) -> RetrievalResult {
        RetrievalResult {
            entry: KnowledgeEntry {
                id: title.to_lowercase(),
                title: title.into(),
                content: content.into(),
                category: String::new(),
                sources: sources.into(),
            },
            score: 10,
        }
    }

    #[test]
    fn domain_gate() {
        assert!(!is_health_related("What's the weather tomorrow?"));
        assert!(is_health_related("What is a healthy blood pressure range?"));
        assert!(is_health_related("How many HOURS of Sleep do I need"));
        assert!(!is_health_related("Who won the football game?"));
    }

    #[test]
    fn system_prompt_injected_once() {
        let composer = PromptComposer::default();
        let history = vec![Message::assistant("hi"), Message::user("sleep?")];
        let composed = composer.compose(&history, &[]);
        assert_eq!(composed[0], Message::system(SYSTEM_PROMPT));
        assert_eq!(&composed[1..], history.as_slice());

        let custom = vec![Message::system("be terse"), Message::user("sleep?")];
        let composed = composer.compose(&custom, &[]);
        assert_eq!(composed, custom);
    }

    #[test]
    fn only_last_user_message_is_augmented() {
        let composer = PromptComposer::default();
        let history = vec![
            Message::user("first question about water"),
            Message::assistant("answer"),
            Message::user("how much water?"),
        ];
        let context = vec![result("Daily Hydration", "Drink 2.7 L.", "NASEM")];
        let composed = composer.compose(&history, &context);

        assert_eq!(composed[1].content, "first question about water");
        let last = &composed[3].content;
        assert!(last.starts_with("how much water?\n\n---"));
        assert!(last.contains("[1] Daily Hydration\nDrink 2.7 L.\nSources: NASEM"));
        assert!(last.contains("Do not repeat it verbatim."));
        // stored history untouched
        assert_eq!(history[2].content, "how much water?");
    }

    #[test]
    fn augment_without_context_is_identity() {
        assert_eq!(augment_user_message("plain", &[]), "plain");
    }

    #[test]
    fn blank_sources_are_omitted() {
        let text = augment_user_message("q", &[result("BMI", "kg/m2", "  ")]);
        assert!(!text.contains("Sources:"));
    }
}
