use crate::{
    backend::Backend,
    catalog::ServiceCatalog,
    config::DiscoveryConfig,
    discovery::heuristics::service_from_metric_name,
    error::{BackendError, CatalogError, DiscoveryError},
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// A service observed during one discovery cycle. Transient: rebuilt every
/// cycle, holding only the metrics seen in that cycle.
#[derive(Debug, Clone)]
pub struct DiscoveredService {
    pub name: String,
    pub namespace: String,
    pub labels: HashMap<String, String>,
    pub metrics: Vec<String>,
}

/// What one discovery cycle saw and wrote.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    pub metrics_total: usize,
    pub metrics_kept: usize,
    pub services_discovered: usize,
    pub services_synced: usize,
    pub write_failures: usize,
}

/// Periodically inventories backend metrics, infers owning services, and
/// synchronizes the Service Catalog.
pub struct DiscoveryEngine {
    backend: Arc<Backend>,
    catalog: Arc<dyn ServiceCatalog>,
    interval: Duration,
    service_labels: Vec<String>,
    exclude: Vec<Regex>,
    namespaces: Vec<String>,
    running: AtomicBool,
    shutdown: Mutex<Option<broadcast::Sender<()>>>,
}

impl DiscoveryEngine {
    pub fn new(
        backend: Arc<Backend>,
        catalog: Arc<dyn ServiceCatalog>,
        config: &DiscoveryConfig,
    ) -> Self {
        // An unparsable exclusion pattern is logged and ignored, not fatal.
        let exclude = config
            .exclude_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "invalid exclusion pattern, ignoring");
                    None
                }
            })
            .collect();

        Self {
            backend,
            catalog,
            interval: Duration::from_secs(config.interval_seconds),
            service_labels: config.service_labels.clone(),
            exclude,
            namespaces: config.namespaces.clone(),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
        }
    }

    /// Validate connectivity, then run one cycle immediately and further
    /// cycles on the configured interval until `stop()`.
    ///
    /// The loop awaits each cycle before selecting the next tick, so the
    /// initial run and scheduled runs are single-flighted; a cycle slower
    /// than the interval delays the next tick instead of overlapping it.
    pub async fn start(self: Arc<Self>) -> Result<(), DiscoveryError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(DiscoveryError::AlreadyRunning);
        }

        // Fail fast: a dead backend means nothing gets scheduled.
        if let Err(e) = self.backend.test_connection().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(DiscoveryError::Probe(e));
        }

        let (tx, mut rx) = broadcast::channel(1);
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(tx);

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = engine.interval.as_secs(),
                "discovery loop started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            result = engine.run_cycle() => match result {
                                Ok(stats) => info!(
                                    metrics_total = stats.metrics_total,
                                    metrics_kept = stats.metrics_kept,
                                    services_discovered = stats.services_discovered,
                                    services_synced = stats.services_synced,
                                    write_failures = stats.write_failures,
                                    "discovery cycle complete"
                                ),
                                Err(e) => error!(error = %e, "discovery cycle aborted"),
                            },
                            _ = rx.recv() => {
                                let cause = BackendError::Cancelled(
                                    "discovery cycle interrupted by stop".to_string(),
                                );
                                warn!(error = %cause, "discovery cycle cancelled");
                                break;
                            }
                        }
                    }
                    _ = rx.recv() => break,
                }
            }

            info!("discovery loop stopped");
            engine.running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    /// Idempotent; never blocks on an in-flight cycle.
    pub fn stop(&self) {
        if let Some(tx) = self
            .shutdown
            .lock()
            .expect("shutdown lock poisoned")
            .take()
        {
            let _ = tx.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// One full discovery pass: inventory, filter, attribute, synchronize.
    pub async fn run_cycle(&self) -> Result<CycleStats, DiscoveryError> {
        let names = self
            .backend
            .metric_names()
            .await
            .map_err(DiscoveryError::Cycle)?;

        let metrics_total = names.len();
        let kept: Vec<String> = names.into_iter().filter(|n| !self.is_excluded(n)).collect();
        let metrics_kept = kept.len();

        let mut discovered: HashMap<(String, String), DiscoveredService> = HashMap::new();
        for metric in &kept {
            let candidates = self.resolve_services(metric).await;
            if candidates.is_empty() {
                continue;
            }

            let namespace = self.resolve_namespace(metric).await;
            if !self.namespaces.is_empty() && !self.namespaces.contains(&namespace) {
                debug!(
                    metric = %metric,
                    namespace = %namespace,
                    "namespace not in allow-list, dropping"
                );
                continue;
            }

            for (name, labels) in candidates {
                let entry = discovered
                    .entry((namespace.clone(), name.clone()))
                    .or_insert_with(|| DiscoveredService {
                        name,
                        namespace: namespace.clone(),
                        labels,
                        metrics: Vec::new(),
                    });
                entry.metrics.push(metric.clone());
            }
        }

        for service in discovered.values_mut() {
            service.metrics.sort();
            service.metrics.dedup();
        }

        let services_discovered = discovered.len();
        let mut services_synced = 0;
        let mut write_failures = 0;

        for service in discovered.values() {
            match self.sync_service(service).await {
                Ok(()) => services_synced += 1,
                Err(e) => {
                    // Best-effort synchronization: one bad write never aborts
                    // the remaining services.
                    write_failures += 1;
                    warn!(
                        service = %service.name,
                        namespace = %service.namespace,
                        error = %e,
                        "catalog write failed"
                    );
                }
            }
        }

        let stats = CycleStats {
            metrics_total,
            metrics_kept,
            services_discovered,
            services_synced,
            write_failures,
        };
        crate::metrics::record_discovery_cycle(&stats);
        Ok(stats)
    }

    fn is_excluded(&self, metric: &str) -> bool {
        self.exclude.iter().any(|re| re.is_match(metric))
    }

    /// Resolve the owning service(s) of a metric: each configured service
    /// label in priority order, then the lexical fallback. A metric may map
    /// to several services.
    async fn resolve_services(&self, metric: &str) -> Vec<(String, HashMap<String, String>)> {
        let matchers = vec![metric.to_string()];

        for label in &self.service_labels {
            match self.backend.label_values(label, &matchers).await {
                Ok(values) => {
                    let found: Vec<(String, HashMap<String, String>)> = values
                        .into_iter()
                        .filter(|v| !v.is_empty())
                        .map(|v| {
                            let labels = HashMap::from([(label.clone(), v.clone())]);
                            (v, labels)
                        })
                        .collect();
                    if !found.is_empty() {
                        return found;
                    }
                }
                Err(e) => {
                    debug!(metric = %metric, label = %label, error = %e, "label query failed");
                }
            }
        }

        match service_from_metric_name(metric) {
            Some(name) => vec![(name, HashMap::new())],
            None => {
                debug!(metric = %metric, "no owning service resolved, dropping metric");
                Vec::new()
            }
        }
    }

    async fn resolve_namespace(&self, metric: &str) -> String {
        let matchers = vec![metric.to_string()];
        match self.backend.label_values("namespace", &matchers).await {
            Ok(values) => values
                .into_iter()
                .find(|v| !v.is_empty())
                .unwrap_or_else(|| "default".to_string()),
            Err(_) => "default".to_string(),
        }
    }

    /// Create-if-absent, then fully replace the metric list. Services not
    /// observed this cycle are left untouched.
    async fn sync_service(&self, service: &DiscoveredService) -> Result<(), CatalogError> {
        let existing = self
            .catalog
            .get_service_by_name(&service.name, &service.namespace)
            .await?;

        let record = match existing {
            Some(record) => record,
            None => {
                self.catalog
                    .create_service(&service.name, &service.namespace, &service.labels)
                    .await?
            }
        };

        self.catalog
            .update_service_metrics(record.id, &service.metrics)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_exclusion_pattern_is_skipped() {
        let backend = Arc::new(Backend::new(
            &crate::config::BackendConfig {
                url: "http://localhost:9090".to_string(),
                kind: "prometheus".to_string(),
                auth_mode: "none".to_string(),
                username: String::new(),
                password: String::new(),
                bearer_token: String::new(),
                tenant_id: None,
                timeout_seconds: 5,
            },
            &crate::config::BreakerConfig::default(),
        ));
        let catalog = Arc::new(crate::catalog::InMemoryCatalog::new());

        let config = DiscoveryConfig {
            enabled: true,
            interval_seconds: 60,
            service_labels: vec!["service".to_string()],
            exclude_patterns: vec!["^go_.*".to_string(), "[invalid".to_string()],
            namespaces: Vec::new(),
        };

        let engine = DiscoveryEngine::new(backend, catalog, &config);
        assert_eq!(engine.exclude.len(), 1);
        assert!(engine.is_excluded("go_goroutines"));
        assert!(!engine.is_excluded("http_requests_total"));
    }
}
