//! @ai:module:intent HTTP client for the VisionTags backend
//! @ai:module:layer infrastructure
//! @ai:module:public_api ApiClient, AnalyzeOptions, HealthOptions, DEFAULT_FEEDBACK_TIMEOUT
//! @ai:module:stateless false

use crate::client::image::{FetchedImageProvider, ImageBytesProvider, NativeFileProvider};
use crate::client::signal::{merge_signals, AbortController, AbortSignal};
use crate::client::timeout::TimeoutGuard;
use crate::config::ClientConfig;
use crate::error::{Error, Operation, Result};
use crate::resolver::{ApiResolver, HealthProbe, ResolveOptions};
use crate::types::{
    AnalysisResponse, EmbeddingPoint, EmbeddingPointsEnvelope, FeedbackAck, FeedbackRequest,
    MetricsSummary,
};
use reqwest::header::ACCEPT;
use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_FEEDBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// @ai:intent Options for one analyze call
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Sent as `X-User`; falls back to the client-wide user.
    pub user: Option<String>,
    pub model: Option<String>,
    pub signal: Option<AbortSignal>,
    pub timeout: Option<Duration>,
}

/// @ai:intent Options for one health ping
#[derive(Debug, Clone, Default)]
pub struct HealthOptions {
    pub signal: Option<AbortSignal>,
    pub timeout: Option<Duration>,
    /// Probe this base instead of the current one.
    pub base: Option<String>,
}

/// @ai:intent Backend client bound to one resolver
pub struct ApiClient {
    http: reqwest::Client,
    resolver: Arc<ApiResolver>,
    images: Box<dyn ImageBytesProvider>,
    user: Option<String>,
    feedback_timeout: Duration,
    pending_timers: Arc<AtomicUsize>,
}

impl ApiClient {
    /// @ai:intent Create a client with a default HTTP stack and native image handling
    /// @ai:effects pure
    pub fn new(resolver: Arc<ApiResolver>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("visiontags/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::ClientBuild)?;

        Ok(Self::with_http_client(http, resolver))
    }

    /// @ai:intent Create a client around an existing reqwest client
    /// @ai:effects pure
    pub fn with_http_client(http: reqwest::Client, resolver: Arc<ApiResolver>) -> Self {
        Self {
            http,
            resolver,
            images: Box::new(NativeFileProvider),
            user: None,
            feedback_timeout: DEFAULT_FEEDBACK_TIMEOUT,
            pending_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// @ai:intent Create a client configured from file settings
    /// @ai:effects pure
    pub fn from_config(config: &ClientConfig, resolver: Arc<ApiResolver>) -> Result<Self> {
        let mut client = Self::new(resolver)?.with_feedback_timeout(config.timeouts.feedback());
        client.user = config.api.user.clone();
        Ok(client)
    }

    pub fn with_image_provider(mut self, provider: impl ImageBytesProvider + 'static) -> Self {
        self.images = Box::new(provider);
        self
    }

    /// @ai:intent Switch to fetch-and-wrap image acquisition sharing this client's HTTP stack
    /// @ai:effects pure
    pub fn with_fetched_images(self) -> Self {
        let provider = FetchedImageProvider::new(self.http.clone());
        self.with_image_provider(provider)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_feedback_timeout(mut self, timeout: Duration) -> Self {
        self.feedback_timeout = timeout;
        self
    }

    pub fn resolver(&self) -> &Arc<ApiResolver> {
        &self.resolver
    }

    /// @ai:intent Base URL requests are currently sent to
    /// @ai:effects pure
    pub fn api_url(&self) -> String {
        self.resolver.current_base()
    }

    /// @ai:intent Number of armed request timers not yet released
    /// @ai:effects pure
    pub fn pending_timers(&self) -> usize {
        self.pending_timers.load(Ordering::SeqCst)
    }

    /// @ai:intent Resolve and memoize a reachable base using this client's health probe
    /// @ai:effects network, state:write
    pub async fn resolve_api_base(&self, opts: ResolveOptions) -> Result<String> {
        self.resolver.resolve(self, opts).await
    }

    /// @ai:intent Ping `<base>/health`; no-op when probing is disabled
    /// @ai:effects network
    pub async fn ping_health(&self, opts: HealthOptions) -> Result<()> {
        if self.resolver.skip_health_probe() {
            return Ok(());
        }

        let base = opts.base.unwrap_or_else(|| self.resolver.current_base());
        self.health_at(&base, opts.signal, opts.timeout).await
    }

    async fn health_at(
        &self,
        base: &str,
        signal: Option<AbortSignal>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let url = format!("{}/health", base);
        tracing::debug!("GET {}", url);

        let request = self.http.get(&url);
        self.run_abortable(Operation::Health, signal, optional_timeout(timeout), async move {
            let response = request.send().await.map_err(|source| Error::Network {
                operation: Operation::Health,
                source,
            })?;
            ensure_success(Operation::Health, response).await
        })
        .await
    }

    /// @ai:intent Upload an image for classification and explanation
    /// @ai:post the request timer is released on every exit path
    /// @ai:effects network, fs:read
    pub async fn analyze_image(
        &self,
        reference: &str,
        opts: AnalyzeOptions,
    ) -> Result<AnalysisResponse> {
        const OP: Operation = Operation::Analyze;

        let AnalyzeOptions {
            user,
            model,
            signal,
            timeout,
        } = opts;

        if signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            return Err(Error::Canceled { operation: OP });
        }

        let url = format!("{}/analyze", self.resolver.current_base());
        tracing::debug!("POST {} ({})", url, reference);
        let started = Instant::now();

        // Image acquisition can itself be a network fetch, so it races the signal too.
        let upload = async {
            let attachment = self.images.attach(reference).await?;
            let mut form = Form::new().part("image", attachment.into_part().await?);
            if let Some(model) = &model {
                form = form.text("model", model.clone());
            }

            let mut request = self
                .http
                .post(&url)
                .header(ACCEPT, "application/json")
                .multipart(form);

            if let Some(user) = user.as_ref().or(self.user.as_ref()) {
                request = request.header("X-User", user);
            }
            if let Some(model) = model.as_ref().filter(|_| self.images.sends_model_header()) {
                request = request.header("X-Model", model);
            }

            let response = request.send().await.map_err(|source| Error::Network {
                operation: OP,
                source,
            })?;
            read_json(OP, response).await
        };

        let result = self
            .run_abortable(OP, signal, optional_timeout(timeout), upload)
            .await;

        tracing::debug!("Analyze settled in {}ms", started.elapsed().as_millis());
        result
    }

    /// @ai:intent Report the true label for a prediction
    /// @ai:effects network
    pub async fn send_feedback(
        &self,
        prediction_id: &str,
        true_label: &str,
        timeout: Option<Duration>,
    ) -> Result<FeedbackAck> {
        const OP: Operation = Operation::Feedback;

        let url = format!("{}/feedback", self.resolver.current_base());
        let request = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&FeedbackRequest {
                prediction_id,
                true_label,
            });

        tracing::debug!("POST {} ({} -> {})", url, prediction_id, true_label);

        let timeout = timeout.unwrap_or(self.feedback_timeout);
        self.run_abortable(OP, None, Some(timeout), async move {
            let response = request.send().await.map_err(|source| Error::Network {
                operation: OP,
                source,
            })?;
            read_json(OP, response).await
        })
        .await
    }

    /// @ai:intent Fetch prediction counts and the confusion matrix
    /// @ai:effects network
    pub async fn metrics_summary(&self) -> Result<MetricsSummary> {
        self.metrics_summary_with(None).await
    }

    /// @ai:intent `metrics_summary`, abandoned when `signal` fires
    /// @ai:effects network
    pub async fn metrics_summary_with(&self, signal: Option<AbortSignal>) -> Result<MetricsSummary> {
        const OP: Operation = Operation::Metrics;

        let url = format!("{}/metrics/summary", self.resolver.current_base());
        tracing::debug!("GET {}", url);

        let request = self.http.get(&url);
        let summary: MetricsSummary = self
            .run_abortable(OP, signal, None, async move {
                let response = request.send().await.map_err(|source| Error::Network {
                    operation: OP,
                    source,
                })?;
                read_json(OP, response).await
            })
            .await?;

        if let Err(problem) = summary.validate() {
            tracing::warn!("Metrics summary is inconsistent: {}", problem);
        }

        Ok(summary)
    }

    /// @ai:intent Fetch stored embedding points, optionally capped
    /// @ai:effects network
    pub async fn embedding_points(&self, limit: Option<u32>) -> Result<Vec<EmbeddingPoint>> {
        self.embedding_points_with(limit, None).await
    }

    pub async fn embedding_points_with(
        &self,
        limit: Option<u32>,
        signal: Option<AbortSignal>,
    ) -> Result<Vec<EmbeddingPoint>> {
        const OP: Operation = Operation::Embeddings;

        let url = format!("{}/embeddings/points", self.resolver.current_base());
        let mut request = self.http.get(&url);
        if let Some(limit) = limit.filter(|l| *l > 0) {
            request = request.query(&[("limit", limit)]);
        }

        tracing::debug!("GET {} (limit {:?})", url, limit);

        let envelope: EmbeddingPointsEnvelope = self
            .run_abortable(OP, signal, None, async move {
                let response = request.send().await.map_err(|source| Error::Network {
                    operation: OP,
                    source,
                })?;
                read_json(OP, response).await
            })
            .await?;

        Ok(envelope.points.unwrap_or_default())
    }

    /// @ai:intent Race `request` against the caller signal and an internal deadline
    /// @ai:effects time
    async fn run_abortable<T, F>(
        &self,
        operation: Operation,
        signal: Option<AbortSignal>,
        timeout: Option<Duration>,
        request: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let controller = AbortController::new();
        let guard = TimeoutGuard::arm(&controller, timeout, &self.pending_timers);
        let merged = merge_signals(signal, Some(controller.signal()))
            .unwrap_or_else(|| controller.signal());

        let outcome = tokio::select! {
            biased;
            _ = merged.aborted() => None,
            result = request => Some(result),
        };

        match outcome {
            Some(result) => result,
            None if guard.fired() => Err(Error::TimedOut {
                operation,
                timeout: timeout.unwrap_or_default(),
            }),
            None => Err(Error::Canceled { operation }),
        }
    }
}

impl HealthProbe for ApiClient {
    async fn probe(&self, base: &str, signal: Option<AbortSignal>, timeout: Duration) -> Result<()> {
        self.health_at(base, signal, Some(timeout)).await
    }
}

/// Optional deadlines treat zero as "none".
fn optional_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

/// @ai:intent Turn a non-2xx response into an Http error
/// @ai:effects network
async fn ensure_success(operation: Operation, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response
        .text()
        .await
        .map_err(|source| Error::Network { operation, source })?;
    Err(Error::Http {
        operation,
        status,
        body,
    })
}

/// @ai:intent Read the body, failing on non-2xx and decoding JSON otherwise
/// @ai:effects network
async fn read_json<T: DeserializeOwned>(operation: Operation, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| Error::Network { operation, source })?;

    if !status.is_success() {
        return Err(Error::Http {
            operation,
            status,
            body,
        });
    }

    serde_json::from_str(&body).map_err(|source| Error::Decode { operation, source })
}
