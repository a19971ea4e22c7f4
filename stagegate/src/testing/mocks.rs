//! Mock producers, reviewers and hooks.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{Artifact, OutputMetadata, ProducerOutput, ReviewVerdict};
use crate::pipeline::{HookContext, PostStepHook};
use crate::stages::{ProduceRequest, Producer, Reviewer};
use crate::state::StateSnapshot;

/// A producer that returns the same content every time and counts calls.
#[derive(Debug)]
pub struct StaticProducer {
    name: String,
    content: String,
    version: String,
    artifacts: Vec<Artifact>,
    timeout: Option<Duration>,
    default_retries: u32,
    calls: AtomicUsize,
}

impl StaticProducer {
    /// Creates a producer returning `content`.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            version: "0.1.0".to_string(),
            artifacts: Vec::new(),
            timeout: None,
            default_retries: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Attaches an artifact to every output.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Sets the reported version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets the intrinsic timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the intrinsic retry count.
    #[must_use]
    pub fn with_default_retries(mut self, retries: u32) -> Self {
        self.default_retries = retries;
        self
    }

    /// Number of times `produce` ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Producer for StaticProducer {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn default_retries(&self) -> u32 {
        self.default_retries
    }

    async fn produce(&self, request: &ProduceRequest) -> anyhow::Result<ProducerOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut output = ProducerOutput::new(self.content.clone()).with_metadata(
            OutputMetadata::new(self.name.clone())
                .with_version(self.version.clone())
                .with_stage(request.stage.clone()),
        );
        output.artifacts.clone_from(&self.artifacts);
        Ok(output)
    }
}

/// A producer that echoes the rendered task and records every request.
#[derive(Debug)]
pub struct EchoProducer {
    name: String,
    requests: Mutex<Vec<ProduceRequest>>,
}

impl EchoProducer {
    /// Creates an echo producer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ProduceRequest> {
        self.requests.lock().clone()
    }

    /// Rendered tasks received so far.
    #[must_use]
    pub fn tasks(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.task.clone()).collect()
    }
}

#[async_trait]
impl Producer for EchoProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, request: &ProduceRequest) -> anyhow::Result<ProducerOutput> {
        self.requests.lock().push(request.clone());
        Ok(ProducerOutput::new(request.task.clone()))
    }
}

/// A producer that sleeps before answering.
#[derive(Debug)]
pub struct SlowProducer {
    name: String,
    delay: Duration,
}

impl SlowProducer {
    /// Creates a producer that takes `delay` per call.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Producer for SlowProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, _request: &ProduceRequest) -> anyhow::Result<ProducerOutput> {
        tokio::time::sleep(self.delay).await;
        Ok(ProducerOutput::new(format!("{} finished", self.name)))
    }
}

/// A producer whose output has blank content.
#[derive(Debug)]
pub struct EmptyProducer {
    name: String,
}

impl EmptyProducer {
    /// Creates the producer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Producer for EmptyProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, _request: &ProduceRequest) -> anyhow::Result<ProducerOutput> {
        Ok(ProducerOutput::new("   "))
    }
}

/// A producer that always errors.
#[derive(Debug)]
pub struct FailingProducer {
    name: String,
    message: String,
}

impl FailingProducer {
    /// Creates a producer failing with `message`.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Producer for FailingProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(&self, _request: &ProduceRequest) -> anyhow::Result<ProducerOutput> {
        Err(anyhow::anyhow!("{}", self.message))
    }
}

/// A reviewer returning the same verdict every time.
#[derive(Debug)]
pub struct FixedReviewer {
    name: String,
    verdict: ReviewVerdict,
    calls: AtomicUsize,
}

impl FixedReviewer {
    /// Creates a reviewer returning `verdict`.
    #[must_use]
    pub fn new(name: impl Into<String>, verdict: ReviewVerdict) -> Self {
        Self {
            name: name.into(),
            verdict,
            calls: AtomicUsize::new(0),
        }
    }

    /// A reviewer that approves with `score`.
    #[must_use]
    pub fn approving(name: impl Into<String>, score: f64) -> Self {
        Self::new(name, ReviewVerdict::approve(score).with_summary("looks good"))
    }

    /// A reviewer that rejects with `score`.
    #[must_use]
    pub fn rejecting(name: impl Into<String>, score: f64) -> Self {
        Self::new(
            name,
            ReviewVerdict::reject(score)
                .with_summary("needs work")
                .with_suggestion("be more specific"),
        )
    }

    /// Number of reviews performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviewer for FixedReviewer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(
        &self,
        _output: &ProducerOutput,
        _task: &str,
        _state: &StateSnapshot,
    ) -> anyhow::Result<ReviewVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict.clone())
    }
}

/// A reviewer that returns scripted verdicts in order, repeating the last.
#[derive(Debug)]
pub struct ScriptedReviewer {
    name: String,
    script: Mutex<VecDeque<ReviewVerdict>>,
    last: Mutex<Option<ReviewVerdict>>,
}

impl ScriptedReviewer {
    /// Creates a reviewer playing back `verdicts`.
    #[must_use]
    pub fn new(name: impl Into<String>, verdicts: impl IntoIterator<Item = ReviewVerdict>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(verdicts.into_iter().collect()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(
        &self,
        _output: &ProducerOutput,
        _task: &str,
        _state: &StateSnapshot,
    ) -> anyhow::Result<ReviewVerdict> {
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(verdict) = next {
            *last = Some(verdict);
        }
        last.clone()
            .ok_or_else(|| anyhow::anyhow!("reviewer '{}' has no scripted verdicts", self.name))
    }
}

/// A reviewer that always errors.
#[derive(Debug)]
pub struct FailingReviewer {
    name: String,
}

impl FailingReviewer {
    /// Creates the reviewer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Reviewer for FailingReviewer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn review(
        &self,
        _output: &ProducerOutput,
        _task: &str,
        _state: &StateSnapshot,
    ) -> anyhow::Result<ReviewVerdict> {
        anyhow::bail!("reviewer '{}' is unavailable", self.name)
    }
}

/// A hook that records the stages it saw, optionally failing.
#[derive(Debug, Default)]
pub struct RecordingHook {
    seen: Mutex<Vec<(String, bool)>>,
    fail: bool,
}

impl RecordingHook {
    /// Creates a recording hook.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hook that records, then fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Stages seen, in order.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(s, _)| s.clone()).collect()
    }

    /// `(stage, approved)` pairs seen, in order.
    #[must_use]
    pub fn seen(&self) -> Vec<(String, bool)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl PostStepHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn after_step(&self, ctx: &HookContext<'_>) -> anyhow::Result<()> {
        self.seen
            .lock()
            .push((ctx.summary.stage.clone(), ctx.summary.approved));
        if self.fail {
            anyhow::bail!("hook failed after '{}'", ctx.summary.stage);
        }
        Ok(())
    }
}
