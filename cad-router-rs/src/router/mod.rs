//! Routing orchestrator
//!
//! Per request: validate, analyze, then run the chosen strategy on a leased
//! handle. Every attempt runs under the breaker of that handle and inside the
//! retry budget; hybrid requests fall back to the script path when the direct
//! call fails.
//!
//! Calls already dispatched into the application cannot be cancelled.
//! Dropping the future returned by [`RoutingOrchestrator::execute`] only stops
//! waiting; the lease and any script artifact are still released.

pub mod direct;
pub mod metrics;

pub use direct::build_direct_call;
pub use metrics::{HealthReport, HealthStatus, MetricsSnapshot, RouterMetrics};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{error, info, warn};

use crate::analysis::{advise, ComplexityAnalyzer, ComplexityReport, SimplificationPlan, Strategy};
use crate::config::RouterConfig;
use crate::core::{CadHandle, DirectCall, FeatureDescriptor, HandleFactory, RouterBuilder};
use crate::error::mapping::{map_null_signal, map_script_signal, summarize};
use crate::error::{ErrorContext, ErrorKind, Result, RouterError};
use crate::operation::{validate, OperationRequest};
use crate::pool::{HandlePool, PoolConfig, PoolLease};
use crate::resilience::{BreakerRegistry, Resilience, RetryExecutor};
use crate::script::{ScriptGenerator, ScriptStore};
use crate::util::{generate_request_id, measure_time_async};

/// Something the caller asks to run once if a direct request fails
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Issue this native call as-is
    Call(DirectCall),
    /// Generate and run the script of this request
    Script(OperationRequest),
}

/// Fallback policy for requests routed `direct`
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FallbackCommand {
    /// Direct failures are terminal
    #[default]
    None,
    /// Run a fixed command once
    Fixed(Command),
    /// Run the script path of the same request once
    Strategy,
}

/// Where handles come from
#[derive(Clone)]
pub enum HandleSource {
    Pool(Arc<HandlePool>),
    /// One shared handle; requests take turns on it
    Single(Arc<dyn CadHandle>),
}

impl HandleSource {
    pub fn pool(factory: Arc<dyn HandleFactory>, config: PoolConfig) -> Self {
        HandleSource::Pool(Arc::new(HandlePool::new(factory, config)))
    }
}

impl std::fmt::Debug for HandleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleSource::Pool(pool) => f.debug_tuple("Pool").field(pool).finish(),
            HandleSource::Single(handle) => f.debug_tuple("Single").field(&handle.id()).finish(),
        }
    }
}

/// How a request was executed
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetadata {
    pub request_id: String,
    pub handle_id: String,
    /// Strategy chosen by the analyzer
    pub planned: Strategy,
    /// Path that produced the result: `direct` or `script`
    pub used: Strategy,
    pub fallback_used: bool,
    /// Attempts across all paths, retries included
    pub attempts: u32,
    pub latency: Duration,
    pub report: ComplexityReport,
}

/// A routed result with its execution metadata
#[derive(Debug, Clone, Serialize)]
pub struct Routed<T> {
    pub value: T,
    pub metadata: ExecutionMetadata,
}

impl<T> Routed<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Leased handle plus whatever keeps it exclusive
struct Checkout<'a> {
    handle: Arc<dyn CadHandle>,
    _lease: Option<PoolLease<'a>>,
    _turn: Option<AsyncMutexGuard<'a, ()>>,
}

#[derive(Debug, Default)]
struct Trace {
    attempts: u32,
    fallback_used: bool,
    handle_id: Option<String>,
}

/// Routes operation requests to the CAD application
pub struct RoutingOrchestrator {
    analyzer: ComplexityAnalyzer,
    generator: ScriptGenerator,
    store: ScriptStore,
    handles: HandleSource,
    single_turn: AsyncMutex<()>,
    breakers: BreakerRegistry,
    retry: RetryExecutor,
    metrics: RouterMetrics,
    max_direct_args: usize,
}

impl std::fmt::Debug for RoutingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingOrchestrator")
            .field("handles", &self.handles)
            .field("breaker_scope", &self.breakers.scope())
            .field("max_direct_args", &self.max_direct_args)
            .finish()
    }
}

impl RoutingOrchestrator {
    pub fn new(config: RouterConfig, handles: HandleSource) -> Self {
        Self {
            analyzer: ComplexityAnalyzer::new(config.analyzer),
            store: ScriptStore::from_config(&config.script),
            generator: ScriptGenerator::new(config.script),
            handles,
            single_turn: AsyncMutex::new(()),
            breakers: BreakerRegistry::new(config.breaker_scope, config.breaker),
            retry: RetryExecutor::new(config.retry),
            metrics: RouterMetrics::default(),
            max_direct_args: config.max_direct_args,
        }
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Routing decision for a request, without executing it
    pub fn analyze(&self, request: &OperationRequest) -> ComplexityReport {
        self.analyzer.analyze(request)
    }

    /// Simplification advice for a request that would route to `script`
    pub fn advise(&self, request: &OperationRequest) -> Option<SimplificationPlan> {
        advise(&self.analyzer, &self.analyzer.analyze(request))
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    /// Metrics, breaker states and pool occupancy
    pub fn health(&self) -> HealthReport {
        let pool = match &self.handles {
            HandleSource::Pool(pool) => Some(pool.status()),
            HandleSource::Single(_) => None,
        };
        HealthReport::new(
            self.metrics.snapshot(),
            self.breakers.scope(),
            self.breakers.snapshots(),
            pool,
        )
    }

    /// Disconnect every handle
    pub async fn shutdown(&self) -> Result<()> {
        match &self.handles {
            HandleSource::Pool(pool) => pool.destroy().await,
            HandleSource::Single(handle) => handle.disconnect().await,
        }
    }

    /// Execute one operation request
    pub async fn execute(
        &self,
        request: &OperationRequest,
        fallback: FallbackCommand,
    ) -> Result<Routed<FeatureDescriptor>> {
        let request_id = generate_request_id();
        let started = Instant::now();
        let mut trace = Trace::default();
        self.metrics.record_request();

        if let Err(err) = validate(request) {
            self.metrics.record_failure();
            warn!(request_id = %request_id, operation = request.operation(), error = %err, "Rejected invalid request");
            return Err(err.with_context(
                ErrorContext::for_operation(request.operation()).request_id(request_id),
            ));
        }

        let report = self.analyzer.analyze(request);
        info!(
            request_id = %request_id,
            operation = request.operation(),
            strategy = %report.strategy,
            effective_count = report.effective_count,
            confidence = report.confidence,
            "Routing decision"
        );

        match self.route(request, &report, fallback, &mut trace).await {
            Ok((value, used)) => {
                self.metrics.record_success();
                let metadata = ExecutionMetadata {
                    request_id,
                    handle_id: trace.handle_id.unwrap_or_default(),
                    planned: report.strategy,
                    used,
                    fallback_used: trace.fallback_used,
                    attempts: trace.attempts,
                    latency: started.elapsed(),
                    report,
                };
                info!(
                    request_id = %metadata.request_id,
                    feature = %value.name,
                    used = %metadata.used,
                    fallback_used = metadata.fallback_used,
                    latency_ms = metadata.latency.as_millis() as u64,
                    "Operation completed"
                );
                Ok(Routed { value, metadata })
            }
            Err(err) => {
                self.metrics.record_failure();
                error!(
                    request_id = %request_id,
                    operation = request.operation(),
                    strategy = %report.strategy,
                    attempts = trace.attempts,
                    error = %summarize(&err),
                    "Operation failed"
                );
                let mut context = ErrorContext::for_operation(request.operation())
                    .strategy(report.strategy)
                    .attempts(trace.attempts)
                    .request_id(request_id);
                if let Some(handle_id) = trace.handle_id {
                    context.add("handle", handle_id);
                }
                Err(err.with_context(context))
            }
        }
    }

    async fn route(
        &self,
        request: &OperationRequest,
        report: &ComplexityReport,
        fallback: FallbackCommand,
        trace: &mut Trace,
    ) -> Result<(FeatureDescriptor, Strategy)> {
        // Failed handle creation is a connection failure and is retried;
        // pool exhaustion is not. Only failed checkouts count as attempts.
        let (checkout, attempts) = self.retry.execute_counted(|| self.checkout()).await;
        self.metrics.record_retries(attempts.saturating_sub(1));
        let checkout = match checkout {
            Ok(checkout) => {
                trace.attempts += attempts - 1;
                checkout
            }
            Err(err) => {
                trace.attempts += attempts;
                return Err(err);
            }
        };
        let handle = checkout.handle.as_ref();
        trace.handle_id = Some(handle.id().to_string());
        let resilience = Resilience::with_breaker(self.retry.clone(), self.breakers.breaker_for(handle.id()));

        match report.strategy {
            Strategy::Direct => match self.run_direct(handle, &resilience, request, trace).await {
                Ok(feature) => Ok((feature, Strategy::Direct)),
                Err(primary) => {
                    self.run_fallback(handle, &resilience, request, fallback, primary, trace)
                        .await
                }
            },
            Strategy::Hybrid => match self.run_direct(handle, &resilience, request, trace).await {
                Ok(feature) => Ok((feature, Strategy::Direct)),
                Err(primary) if primary.kind() == ErrorKind::Validation => Err(primary),
                Err(primary) => {
                    warn!(
                        operation = request.operation(),
                        error = %summarize(&primary),
                        "Direct attempt failed, falling back to script"
                    );
                    trace.fallback_used = true;
                    self.metrics.record_fallback();
                    match self.run_script(handle, &resilience, request, trace).await {
                        Ok(feature) => Ok((feature, Strategy::Script)),
                        Err(secondary) => Err(RouterError::combined(primary, secondary)),
                    }
                }
            },
            Strategy::Script => self
                .run_script(handle, &resilience, request, trace)
                .await
                .map(|feature| (feature, Strategy::Script)),
        }
    }

    async fn run_fallback(
        &self,
        handle: &dyn CadHandle,
        resilience: &Resilience,
        request: &OperationRequest,
        fallback: FallbackCommand,
        primary: RouterError,
        trace: &mut Trace,
    ) -> Result<(FeatureDescriptor, Strategy)> {
        if primary.kind() == ErrorKind::Validation {
            return Err(primary);
        }

        let outcome = match fallback {
            FallbackCommand::None => return Err(primary),
            FallbackCommand::Fixed(Command::Call(call)) => {
                self.note_fallback(request, &primary, "fixed call", trace);
                self.invoke(handle, resilience, &call, trace)
                    .await
                    .map(|feature| (feature, Strategy::Direct))
            }
            FallbackCommand::Fixed(Command::Script(other)) => {
                self.note_fallback(request, &primary, "fixed script", trace);
                match validate(&other) {
                    Ok(()) => self
                        .run_script(handle, resilience, &other, trace)
                        .await
                        .map(|feature| (feature, Strategy::Script)),
                    Err(err) => Err(err),
                }
            }
            FallbackCommand::Strategy => {
                self.note_fallback(request, &primary, "script", trace);
                self.run_script(handle, resilience, request, trace)
                    .await
                    .map(|feature| (feature, Strategy::Script))
            }
        };

        outcome.map_err(|secondary| RouterError::combined(primary, secondary))
    }

    fn note_fallback(&self, request: &OperationRequest, primary: &RouterError, kind: &str, trace: &mut Trace) {
        warn!(
            operation = request.operation(),
            fallback = kind,
            error = %summarize(primary),
            "Direct call failed, running caller fallback"
        );
        trace.fallback_used = true;
        self.metrics.record_fallback();
    }

    async fn checkout(&self) -> Result<Checkout<'_>> {
        match &self.handles {
            HandleSource::Pool(pool) => {
                let lease = pool.lease().await?;
                Ok(Checkout {
                    handle: Arc::clone(lease.handle()),
                    _lease: Some(lease),
                    _turn: None,
                })
            }
            HandleSource::Single(handle) => Ok(Checkout {
                handle: Arc::clone(handle),
                _lease: None,
                _turn: Some(self.single_turn.lock().await),
            }),
        }
    }

    /// Run one attempt-counted operation under the resilience facade
    async fn attempt<F, Fut, T>(
        &self,
        resilience: &Resilience,
        strategy: Strategy,
        trace: &mut Trace,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let metrics = &self.metrics;
        let (result, attempts) = resilience
            .execute_counted(move || {
                let call = operation();
                async move {
                    match strategy {
                        Strategy::Script => metrics.record_script_attempt(),
                        _ => metrics.record_direct_attempt(),
                    }
                    let (result, elapsed) = measure_time_async(|| call).await;
                    metrics.record_latency(elapsed);
                    result
                }
            })
            .await;

        trace.attempts += attempts;
        self.metrics.record_retries(attempts.saturating_sub(1));
        if matches!(&result, Err(err) if err.is_circuit_open()) {
            self.metrics.record_rejection();
        }
        result
    }

    async fn invoke(
        &self,
        handle: &dyn CadHandle,
        resilience: &Resilience,
        call: &DirectCall,
        trace: &mut Trace,
    ) -> Result<FeatureDescriptor> {
        self.attempt(resilience, Strategy::Direct, trace, move || async move {
            let feature = handle.invoke(call).await?;
            map_null_signal(&call.method, feature)
        })
        .await
    }

    async fn run_direct(
        &self,
        handle: &dyn CadHandle,
        resilience: &Resilience,
        request: &OperationRequest,
        trace: &mut Trace,
    ) -> Result<FeatureDescriptor> {
        let call = build_direct_call(request, self.max_direct_args)?;
        self.invoke(handle, resilience, &call, trace).await
    }

    async fn run_script(
        &self,
        handle: &dyn CadHandle,
        resilience: &Resilience,
        request: &OperationRequest,
        trace: &mut Trace,
    ) -> Result<FeatureDescriptor> {
        let script = self.generator.generate(request)?;
        let artifact = self.store.persist(&script)?;

        let path = artifact.path();
        let (module, procedure) = (script.module.as_str(), script.procedure.as_str());
        let ran = self
            .attempt(resilience, Strategy::Script, trace, move || async move {
                let succeeded = handle.run_script(path, module, procedure).await?;
                map_script_signal(module, procedure, succeeded)
            })
            .await;

        if let Err(err) = artifact.remove() {
            warn!(script_id = %script.id, error = %err, "Script artifact was not removed");
        }
        ran?;

        resilience
            .execute(move || async move { map_null_signal("last_feature", handle.last_feature().await?) })
            .await
    }
}
