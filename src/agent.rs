use crate::config::prompt::{ Intent, PromptConfig };
use crate::history::{ format_history_for_log, Conversation };
use crate::llm::chat::{ ChatClient, ChatError, DeltaCallback };
use crate::models::chat::{ Role, Turn };
use crate::models::event::ChatEvent;

use futures::StreamExt;
use log::{ debug, error, info, warn };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use thiserror::Error;
use tokio::sync::mpsc::{ self, UnboundedSender };
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

pub const STOPPED_MARKER: &str = "[Generation stopped by user]";
const FAILURE_PREFIX: &str = "Gemini request failed: ";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("a generation is already in progress")]
    Busy,
}

/// Receiver of conversation updates, implemented by whatever renders the chat.
///
/// Calls arrive on the dispatcher task in the order the coordinator produced
/// them; the idle status (`on_status("")`) is always the last call of a
/// generation.
pub trait PresentationSink: Send + 'static {
    fn on_user_turn_appended(&mut self, text: &str);
    fn on_assistant_turn_started(&mut self);
    fn on_assistant_delta(&mut self, text: &str);
    fn on_assistant_turn_finished(&mut self);
    fn on_assistant_turn_complete(&mut self, text: &str);
    fn on_status(&mut self, text: &str);
}

pub fn dispatch_event(sink: &mut dyn PresentationSink, event: ChatEvent) {
    match event {
        ChatEvent::UserTurnAppended { text } => sink.on_user_turn_appended(&text),
        ChatEvent::AssistantTurnStarted => sink.on_assistant_turn_started(),
        ChatEvent::AssistantDelta { text } => sink.on_assistant_delta(&text),
        ChatEvent::AssistantTurnFinished => sink.on_assistant_turn_finished(),
        ChatEvent::AssistantTurnComplete { text } => sink.on_assistant_turn_complete(&text),
        ChatEvent::Status { text } => sink.on_status(&text),
    }
}

/// Starts a task that forwards events to `sink` one at a time.
///
/// The task ends once every sender is dropped and hands the sink back.
pub fn spawn_sink<S: PresentationSink>(mut sink: S) -> (UnboundedSender<ChatEvent>, JoinHandle<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        let mut events = UnboundedReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            dispatch_event(&mut sink, event);
        }
        sink
    });
    (tx, handle)
}

#[derive(Debug, Default)]
struct GenerationSession {
    running: AtomicBool,
    cancel_requested: AtomicBool,
}

/// Owns one conversation and runs at most one generation over it at a time.
#[derive(Clone)]
pub struct GenerationCoordinator {
    client: Arc<dyn ChatClient>,
    prompts: Arc<PromptConfig>,
    conversation: Arc<Mutex<Conversation>>,
    session: Arc<GenerationSession>,
    events: UnboundedSender<ChatEvent>,
}

impl GenerationCoordinator {
    pub fn new(
        client: Arc<dyn ChatClient>,
        prompts: Arc<PromptConfig>,
        events: UnboundedSender<ChatEvent>
    ) -> Self {
        Self {
            client,
            prompts,
            conversation: Arc::new(Mutex::new(Conversation::new())),
            session: Arc::new(GenerationSession::default()),
            events,
        }
    }

    /// Free-form chat input, answered as a programming question. Blank input is ignored.
    pub fn send_chat_message(&self, message: &str) -> Result<Option<JoinHandle<()>>, AgentError> {
        if message.trim().is_empty() {
            return Ok(None);
        }
        self.start_generation(Intent::ProgrammingQuestion, message, None).map(Some)
    }

    /// Runs `intent` over `content`; blank content is ignored.
    pub fn send_intent(
        &self,
        intent: Intent,
        content: &str,
        context: Option<&str>
    ) -> Result<Option<JoinHandle<()>>, AgentError> {
        if content.trim().is_empty() {
            return Ok(None);
        }
        self.start_generation(intent, content, context).map(Some)
    }

    pub fn start_generation(
        &self,
        intent: Intent,
        content: &str,
        extra_context: Option<&str>
    ) -> Result<JoinHandle<()>, AgentError> {
        let prompt = self.prompts.build_prompt(intent, content, extra_context);
        self.submit(intent, prompt)
    }

    /// Appends `prompt` as a user turn and answers it on a background task.
    ///
    /// Fails with [`AgentError::Busy`] without touching the conversation while
    /// another generation is running.
    pub fn submit(&self, intent: Intent, prompt: String) -> Result<JoinHandle<()>, AgentError> {
        if
            self.session.running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            warn!("Rejecting '{}' request: a generation is already running", intent);
            return Err(AgentError::Busy);
        }
        self.session.cancel_requested.store(false, Ordering::Release);

        self.conversation().append_user(prompt.clone());
        self.notify(ChatEvent::UserTurnAppended { text: prompt });
        self.notify(ChatEvent::Status { text: format!("Working on {}...", intent.title()) });

        let worker = self.clone();
        Ok(
            tokio::spawn(async move {
                let _session = SessionGuard { coordinator: &worker };
                worker.run_generation().await;
            })
        )
    }

    /// Asks the running generation to stop. Deltas still arriving are dropped;
    /// the request itself is left to finish.
    pub fn request_cancel(&self) {
        if self.is_generating() {
            info!("Stop requested for the running generation");
        }
        self.session.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_generating(&self) -> bool {
        self.session.running.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.conversation().snapshot()
    }

    pub fn clear_conversation(&self) -> Result<(), AgentError> {
        if self.is_generating() {
            return Err(AgentError::Busy);
        }
        self.conversation().clear();
        Ok(())
    }

    /// Re-emits the existing turns so a freshly attached view can show them.
    pub fn replay_history(&self) {
        for turn in self.snapshot() {
            match turn.role {
                Role::User => self.notify(ChatEvent::UserTurnAppended { text: turn.text }),
                Role::Model => self.notify(ChatEvent::AssistantTurnComplete { text: turn.text }),
            }
        }
    }

    async fn run_generation(&self) {
        let turns = self.snapshot();
        debug!("{}", format_history_for_log(&self.conversation()));

        if self.client.supports_streaming() {
            self.generate_streaming(&turns).await;
        } else {
            self.generate_single(&turns).await;
        }
    }

    async fn generate_streaming(&self, turns: &[Turn]) {
        self.notify(ChatEvent::AssistantTurnStarted);

        let on_delta: DeltaCallback<'_> = &mut |chunk: &str| self.apply_delta(chunk);
        let result = self.client.generate_content(turns, Some(on_delta)).await;

        let marker = match result {
            Ok(_) if self.cancel_requested() => Some(STOPPED_MARKER.to_string()),
            Ok(text) => {
                info!("Streamed {} chars from {}", text.len(), self.client.get_model());
                None
            }
            Err(e) => Some(self.failure_text(&e)),
        };

        if let Some(marker) = marker {
            self.finish_with_marker(&marker);
        }
        {
            let mut conversation = self.conversation();
            if conversation.last().map(|turn| turn.role) != Some(Role::Model) {
                conversation.append_model(String::new());
            }
        }
        self.notify(ChatEvent::AssistantTurnFinished);
    }

    async fn generate_single(&self, turns: &[Turn]) {
        let text = match self.client.generate_content(turns, None).await {
            Ok(_) if self.cancel_requested() => STOPPED_MARKER.to_string(),
            Ok(text) => {
                info!("Received {} chars from {}", text.len(), self.client.get_model());
                text
            }
            Err(e) => self.failure_text(&e),
        };

        self.conversation().append_model(text.clone());
        self.notify(ChatEvent::AssistantTurnComplete { text });
    }

    fn apply_delta(&self, chunk: &str) {
        if self.cancel_requested() {
            return;
        }
        self.conversation().append_model_delta(chunk);
        self.notify(ChatEvent::AssistantDelta { text: chunk.to_string() });
    }

    /// Closes the streaming turn with `marker`, separated from any partial text.
    fn finish_with_marker(&self, marker: &str) {
        let chunk = {
            let mut conversation = self.conversation();
            let has_partial = matches!(
                conversation.last(),
                Some(turn) if turn.role == Role::Model && !turn.text.is_empty()
            );
            let chunk = if has_partial { format!("\n\n{}", marker) } else { marker.to_string() };
            conversation.append_model_delta(&chunk);
            chunk
        };
        self.notify(ChatEvent::AssistantDelta { text: chunk });
    }

    fn failure_text(&self, err: &ChatError) -> String {
        if self.cancel_requested() {
            info!("Generation stopped by user ({})", err);
            return STOPPED_MARKER.to_string();
        }
        error!("Gemini request failed: {}", err);
        format!("{}{}", FAILURE_PREFIX, err)
    }

    fn cancel_requested(&self) -> bool {
        self.session.cancel_requested.load(Ordering::Acquire)
    }

    fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: ChatEvent) {
        if self.events.send(event).is_err() {
            debug!("Presentation sink is gone; dropping event");
        }
    }
}

/// Resets the session flags and reports idle when the worker ends, even if it panicked.
///
/// `running` is released last, so the next `submit` cannot start before the
/// idle status is queued or have its cancel request wiped.
struct SessionGuard<'a> {
    coordinator: &'a GenerationCoordinator,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let session = &self.coordinator.session;
        session.cancel_requested.store(false, Ordering::Release);
        self.coordinator.notify(ChatEvent::Status { text: String::new() });
        session.running.store(false, Ordering::Release);
    }
}
