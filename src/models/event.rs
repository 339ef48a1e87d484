/// Notifications sent from the generation worker to the presentation layer.
///
/// Events for one conversation travel through a single channel, so a sink
/// sees them in the order they were produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    UserTurnAppended {
        text: String,
    },
    AssistantTurnStarted,
    AssistantDelta {
        text: String,
    },
    AssistantTurnFinished,
    AssistantTurnComplete {
        text: String,
    },
    Status {
        text: String,
    },
}
