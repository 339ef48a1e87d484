use crate::models::chat::{ Role, Turn };
use uuid::Uuid;

/// In-memory, ordered log of the turns exchanged in one chat session.
///
/// Turns are replayed verbatim into every request, so the log is only ever
/// appended to; the single exception is the trailing model turn, which grows
/// in place while a response streams in.
#[derive(Clone, Debug)]
pub struct Conversation {
    id: String,
    turns: Vec<Turn>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    pub fn append_model(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::model(text));
    }

    /// Extends the trailing model turn with `chunk`, or starts a new model
    /// turn when the log is empty or ends with a user turn.
    pub fn append_model_delta(&mut self, chunk: &str) {
        match self.turns.last_mut() {
            Some(last) if last.role == Role::Model => last.text.push_str(chunk),
            _ => self.turns.push(Turn::model(chunk)),
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

pub fn format_history_for_log(conversation: &Conversation) -> String {
    if conversation.is_empty() {
        return String::new();
    }
    let mut result = format!("Conversation {}:\n", conversation.id());
    for turn in conversation.turns() {
        let role_display = match turn.role {
            Role::User => "User",
            Role::Model => "Model",
        };
        result.push_str(&format!("{}: {} chars\n", role_display, turn.text.len()));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_extends_trailing_model_turn() {
        let mut conversation = Conversation::new();
        conversation.append_user("hello");
        conversation.append_model_delta("He");
        conversation.append_model_delta("llo");

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.last(), Some(&Turn::model("Hello")));
    }

    #[test]
    fn split_deltas_match_single_delta() {
        let mut split = Conversation::new();
        split.append_user("q");
        for chunk in ["He", "llo"] {
            split.append_model_delta(chunk);
        }

        let mut whole = Conversation::new();
        whole.append_user("q");
        whole.append_model_delta("Hello");

        assert_eq!(split.snapshot(), whole.snapshot());
    }

    #[test]
    fn delta_after_user_turn_starts_new_model_turn() {
        let mut conversation = Conversation::new();
        conversation.append_model("first answer");
        conversation.append_user("follow up");
        conversation.append_model_delta("second");

        let turns = conversation.snapshot();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text, "first answer");
        assert_eq!(turns[2], Turn::model("second"));
    }

    #[test]
    fn delta_on_empty_log_creates_model_turn() {
        let mut conversation = Conversation::new();
        conversation.append_model_delta("orphan");
        assert_eq!(conversation.snapshot(), vec![Turn::model("orphan")]);
    }

    #[test]
    fn clear_then_append_user_yields_single_turn() {
        let mut conversation = Conversation::new();
        conversation.append_user("a");
        conversation.append_model("b");
        conversation.clear();
        conversation.append_user("hi");

        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation.turns()[0], Turn::user("hi"));
    }

    #[test]
    fn snapshot_is_detached_from_live_log() {
        let mut conversation = Conversation::new();
        conversation.append_user("a");
        let snapshot = conversation.snapshot();
        conversation.append_model_delta("b");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn history_log_summary_lists_roles() {
        let mut conversation = Conversation::new();
        assert!(format_history_for_log(&conversation).is_empty());
        conversation.append_user("abc");
        conversation.append_model("de");
        let summary = format_history_for_log(&conversation);
        assert!(summary.contains("User: 3 chars"));
        assert!(summary.contains("Model: 2 chars"));
    }
}
