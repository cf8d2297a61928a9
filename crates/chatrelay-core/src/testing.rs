//! In-memory collaborators for exercising the relay pipeline.
//!
//! Enabled for this crate's own tests and, through the `test-utils`
//! feature, for downstream crates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::Notify;

use crate::domain::ChannelId;
use crate::events::RelayEvent;
use crate::ports::{EventPublisher, FragmentStream, GenerationClient, GenerationError, PublishError};

type FailPredicate = Box<dyn Fn(&RelayEvent) -> bool + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publisher that records every accepted event in submission order.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(ChannelId, RelayEvent)>>,
    attempts: AtomicUsize,
    fail_when: Mutex<Option<FailPredicate>>,
    notify: Notify,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject (and do not record) events matching `predicate`.
    pub fn fail_on(&self, predicate: impl Fn(&RelayEvent) -> bool + Send + Sync + 'static) {
        *lock(&self.fail_when) = Some(Box::new(predicate));
    }

    /// Accepted events for one channel, in order.
    pub fn events_for(&self, channel: &ChannelId) -> Vec<RelayEvent> {
        lock(&self.events)
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn total_events(&self) -> usize {
        lock(&self.events).len()
    }

    /// Publish calls seen, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until `channel` has at least `count` accepted events.
    pub async fn wait_for_events(&self, channel: &ChannelId, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.events_for(channel).len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, channel: &ChannelId, event: &RelayEvent) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let rejected = lock(&self.fail_when).as_ref().is_some_and(|f| f(event));
        if rejected {
            return Err(PublishError::Transport("scripted publish failure".into()));
        }
        lock(&self.events).push((channel.clone(), event.clone()));
        self.notify.notify_waiters();
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Step {
    Fragment(String),
    Fail(GenerationError),
}

/// Generation client that replays a fixed script for every prompt.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    steps: Vec<Step>,
    open_error: Option<GenerationError>,
    stall: bool,
    delay: Option<Duration>,
    pulled: Arc<AtomicUsize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Yield `fragments`, then end cleanly.
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: fragments
                .into_iter()
                .map(|f| Step::Fragment(f.into()))
                .collect(),
            ..Self::default()
        }
    }

    /// Fail when the stream is opened.
    pub fn failing_to_open(error: GenerationError) -> Self {
        Self {
            open_error: Some(error),
            ..Self::default()
        }
    }

    /// After the scripted fragments, fail with `error`.
    #[must_use]
    pub fn then_fail(mut self, error: GenerationError) -> Self {
        self.steps.push(Step::Fail(error));
        self
    }

    /// After the scripted fragments, never yield again.
    #[must_use]
    pub fn then_stall(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Sleep before every step.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fragments handed to consumers so far, across all streams.
    pub fn fragments_pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, GenerationError> {
        lock(&self.prompts).push(prompt.to_string());
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }

        let steps: VecDeque<Step> = self.steps.iter().cloned().collect();
        let pulled = Arc::clone(&self.pulled);
        let stall = self.stall;
        let delay = self.delay;

        let stream = futures_util::stream::unfold(Some(steps), move |state| {
            let pulled = Arc::clone(&pulled);
            async move {
                let mut steps = state?;
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                match steps.pop_front() {
                    Some(Step::Fragment(fragment)) => {
                        pulled.fetch_add(1, Ordering::SeqCst);
                        Some((Ok(fragment), Some(steps)))
                    }
                    Some(Step::Fail(err)) => Some((Err(err), None)),
                    None => {
                        if stall {
                            std::future::pending::<()>().await;
                        }
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
