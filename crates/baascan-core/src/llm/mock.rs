//! Mock generator for testing.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{GenerationError, GenerationFuture, StructuredRequest, TextGenerator};

/// A configurable mock reply for [`MockGenerator`].
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Free-form text; also returned as the payload of structured calls.
    Text(String),
    /// Structured payload (`None` simulates an answer without one).
    Payload(Option<String>),
    /// Simulate a failed call.
    Error(GenerationError),
}

type ReplyFn = Box<dyn Fn(&str) -> MockReply + Send + Sync>;

/// A hand-rolled mock implementing [`TextGenerator`] for tests.
///
/// Supports:
/// - A fixed reply (used for every call), **or**
/// - A sequence of replies (one per call, repeating the last if exhausted), **or**
/// - A reply computed from the prompt.
/// - Optional per-call latency.
/// - Call counting via [`call_count()`](MockGenerator::call_count).
pub struct MockGenerator {
    name: &'static str,
    responses: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    handler: Option<ReplyFn>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// Create a mock that always returns `reply`.
    pub fn new(name: &'static str, reply: MockReply) -> Self {
        Self {
            name,
            responses: Mutex::new(Vec::new()),
            fallback: reply,
            handler: None,
            delay: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that returns replies in order, repeating the last one.
    pub fn with_sequence(name: &'static str, mut replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "sequence must have at least one reply");
        // Reverse so we can pop() from the front cheaply.
        replies.reverse();
        let fallback = replies[0].clone();
        let mut mock = Self::new(name, fallback);
        mock.responses = Mutex::new(replies);
        mock
    }

    /// Create a mock whose reply depends on the prompt it receives.
    pub fn from_fn(
        name: &'static str,
        handler: impl Fn(&str) -> MockReply + Send + Sync + 'static,
    ) -> Self {
        let mut mock = Self::new(name, MockReply::Payload(None));
        mock.handler = Some(Box::new(handler));
        mock
    }

    /// Set simulated network latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times the generator has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every prompt received so far (structured calls record the user prompt).
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        if let Some(handler) = &self.handler {
            return handler(prompt);
        }
        let mut seq = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        self.name
    }

    fn generate<'a>(&'a self, prompt: &'a str) -> GenerationFuture<'a, String> {
        let reply = self.next_reply(prompt);
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Payload(payload) => Ok(payload.unwrap_or_default()),
                MockReply::Error(err) => Err(err),
            }
        })
    }

    fn generate_structured<'a>(
        &'a self,
        request: &'a StructuredRequest,
    ) -> GenerationFuture<'a, Option<String>> {
        let reply = self.next_reply(&request.user);
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match reply {
                MockReply::Text(text) => Ok(Some(text)),
                MockReply::Payload(payload) => Ok(payload),
                MockReply::Error(err) => Err(err),
            }
        })
    }
}
