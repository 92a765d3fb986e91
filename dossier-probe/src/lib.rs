//! DOSSIER Probe - AI Prober Registry and Providers
//!
//! The prober contracts themselves live in dossier-core. This crate holds the
//! registry the engine resolves providers from, scripted mock providers for
//! tests and the simulator, and an HTTP client for a JSON probe service.

pub mod http;

pub use http::{HttpProbeClient, ProbeClientConfig};

use async_trait::async_trait;
use dossier_core::{
    FieldProbeRequest, FieldProbeResponse, FieldProber, IncidentProbeRequest,
    IncidentProbeResponse, IncidentProber, ProbeError, SummaryGenerator, SummaryRequest,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// PROBER REGISTRY
// ============================================================================

/// Registry for AI probe providers.
/// Providers must be explicitly registered - no auto-discovery.
///
/// # Example
/// ```ignore
/// let mut registry = ProberRegistry::new();
/// registry.register_field(Box::new(ScriptedFieldProber::new()));
/// let prober = registry.field()?;
/// ```
#[derive(Clone, Default)]
pub struct ProberRegistry {
    field: Option<Arc<dyn FieldProber>>,
    incident: Option<Arc<dyn IncidentProber>>,
    summary: Option<Arc<dyn SummaryGenerator>>,
}

impl ProberRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every contract against one client.
    pub fn with_http(client: HttpProbeClient) -> Self {
        let shared = Arc::new(client);
        Self {
            field: Some(shared.clone() as Arc<dyn FieldProber>),
            incident: Some(shared.clone() as Arc<dyn IncidentProber>),
            summary: Some(shared as Arc<dyn SummaryGenerator>),
        }
    }

    /// Register a field prober, replacing any previous one.
    pub fn register_field(&mut self, prober: Box<dyn FieldProber>) {
        self.field = Some(Arc::from(prober));
    }

    pub fn register_incident(&mut self, prober: Box<dyn IncidentProber>) {
        self.incident = Some(Arc::from(prober));
    }

    pub fn register_summary(&mut self, generator: Box<dyn SummaryGenerator>) {
        self.summary = Some(Arc::from(generator));
    }

    /// Get the registered field prober.
    ///
    /// # Returns
    /// * `Err(ProbeError::ProviderNotConfigured)` - If no provider registered
    pub fn field(&self) -> Result<Arc<dyn FieldProber>, ProbeError> {
        self.field.clone().ok_or_else(|| not_configured("field prober"))
    }

    pub fn incident(&self) -> Result<Arc<dyn IncidentProber>, ProbeError> {
        self.incident
            .clone()
            .ok_or_else(|| not_configured("incident prober"))
    }

    pub fn summary(&self) -> Result<Arc<dyn SummaryGenerator>, ProbeError> {
        self.summary
            .clone()
            .ok_or_else(|| not_configured("summary generator"))
    }

    pub fn has_field(&self) -> bool {
        self.field.is_some()
    }

    pub fn has_incident(&self) -> bool {
        self.incident.is_some()
    }

    pub fn has_summary(&self) -> bool {
        self.summary.is_some()
    }
}

fn not_configured(contract: &str) -> ProbeError {
    ProbeError::ProviderNotConfigured {
        contract: contract.to_string(),
    }
}

impl std::fmt::Debug for ProberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProberRegistry")
            .field("field", &self.field.as_ref().map(|p| p.name().to_string()))
            .field("incident", &self.incident.as_ref().map(|p| p.name().to_string()))
            .field("summary", &self.summary.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

// ============================================================================
// MOCK PROVIDERS FOR TESTING
// ============================================================================

/// Field prober that replays a script of responses, then falls back to a
/// fixed response. Every request is recorded.
#[derive(Clone)]
pub struct ScriptedFieldProber {
    script: Arc<Mutex<VecDeque<Result<FieldProbeResponse, ProbeError>>>>,
    fallback: FieldProbeResponse,
    requests: Arc<Mutex<Vec<FieldProbeRequest>>>,
}

impl ScriptedFieldProber {
    /// Empty script; every call answers `NEXT_FIELD`.
    pub fn new() -> Self {
        Self::with_fallback(FieldProbeResponse::next_field())
    }

    pub fn with_fallback(fallback: FieldProbeResponse) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a response for the next call.
    pub fn then(self, response: FieldProbeResponse) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a transport failure for the next call.
    pub fn then_fail(self, error: ProbeError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, next: Result<FieldProbeResponse, ProbeError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(next);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<FieldProbeRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for ScriptedFieldProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FieldProber for ScriptedFieldProber {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn probe_field(
        &self,
        request: &FieldProbeRequest,
    ) -> Result<FieldProbeResponse, ProbeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// How a scripted incident prober behaves once its script runs out.
#[derive(Debug, Clone)]
pub enum IncidentFallback {
    Respond(IncidentProbeResponse),
    /// Never resolve; simulates a stalled AI service
    Stall,
}

/// Incident prober that replays a script of responses with an optional delay.
#[derive(Clone)]
pub struct ScriptedIncidentProber {
    script: Arc<Mutex<VecDeque<Result<IncidentProbeResponse, ProbeError>>>>,
    fallback: IncidentFallback,
    delay: Option<Duration>,
    requests: Arc<Mutex<Vec<IncidentProbeRequest>>>,
}

impl ScriptedIncidentProber {
    /// Empty script; every call answers `Complete`.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: IncidentFallback::Respond(IncidentProbeResponse::Complete),
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A prober that never answers.
    pub fn stalled() -> Self {
        Self {
            fallback: IncidentFallback::Stall,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn then_prompt(self, text: impl Into<String>) -> Self {
        self.push(Ok(IncidentProbeResponse::Prompt { text: text.into() }));
        self
    }

    pub fn then(self, response: IncidentProbeResponse) -> Self {
        self.push(Ok(response));
        self
    }

    pub fn then_fail(self, error: ProbeError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, next: Result<IncidentProbeResponse, ProbeError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(next);
        }
    }

    pub fn requests(&self) -> Vec<IncidentProbeRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl Default for ScriptedIncidentProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncidentProber for ScriptedIncidentProber {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn next_prompt(
        &self,
        request: &IncidentProbeRequest,
    ) -> Result<IncidentProbeResponse, ProbeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(result) => result,
            None => match &self.fallback {
                IncidentFallback::Respond(response) => Ok(response.clone()),
                IncidentFallback::Stall => std::future::pending().await,
            },
        }
    }
}

/// Summary generator that renders the collected answers.
#[derive(Debug, Clone, Default)]
pub struct MockSummaryGenerator {
    failing: bool,
    calls: Arc<AtomicUsize>,
}

impl MockSummaryGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryGenerator for MockSummaryGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn summarize_instance(&self, request: &SummaryRequest) -> Result<String, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(ProbeError::SummaryFailed {
                reason: "mock generator configured to fail".to_string(),
            });
        }
        let details: Vec<String> = request
            .answers
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        Ok(format!(
            "Summary: {} #{} ({} AI turns) {}",
            request.pack_id,
            request.instance_number,
            request.exchanges.len(),
            details.join("; ")
        ))
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
