//! The cycle orchestrator: scrape → reindex → match → resolve → gate →
//! deliver → record, with per-source and per-client failure containment.
//!
//! At most one cycle runs at a time; the engine owns that single gate.
//! Components below it take no application-level locks of their own and
//! rely on the single-writer invariants (ingest writes the store, the
//! recording stage writes the ledger, builds hold the index exclusively).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use delivery::{apply_phone_gate, build_reports, Deliverer};
use embedding::{Embedder, EmbeddingConfig};
use index::{EmbeddingIndex, IndexError, IndexStatus};
use ingest::Scraper;
use matcher::{
    ClientAssignment, ClientDirectory, ClientMatcher, ClientProfile, ClientSelection,
    MatchOverrides, MatchSettings,
};
use resolver::{resolve, Assignments};
use serde::{Deserialize, Serialize};
use store::{DeliveryLedger, PermitStore};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::summary::{
    ClientOutcome, CycleStage, CycleSummary, ReindexOutcome, SourceOutcome,
};

/// Errors that abort a cycle outright. Everything else is contained per
/// row, per source, or per client and lands in the cycle summary instead.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("index error: {0}")]
    Index(#[from] index::IndexError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another cycle is already running")]
    Busy,
}

/// Cooperative cancellation checked at stage boundaries. Recording is
/// still attempted after cancellation; it is idempotent and skipping it
/// would invite redelivery.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live status for dashboards and on-demand inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub stage: CycleStage,
    pub permits: usize,
    pub ledger_rows: usize,
    pub index: IndexStatus,
}

/// The assembled pipeline. Components are owned here and passed down
/// explicitly; nothing in the system is process-global.
pub struct Engine {
    config: Config,
    store: PermitStore,
    ledger: DeliveryLedger,
    index: Arc<EmbeddingIndex>,
    matcher: ClientMatcher,
    directory: Arc<dyn ClientDirectory>,
    deliverer: Arc<dyn Deliverer>,
    scrapers: HashMap<String, Arc<dyn Scraper>>,
    stage: StdMutex<CycleStage>,
    cycle_gate: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn new(
        config: Config,
        directory: Arc<dyn ClientDirectory>,
        deliverer: Arc<dyn Deliverer>,
        scrapers: HashMap<String, Arc<dyn Scraper>>,
    ) -> Result<Self, CycleError> {
        if let Some(parent) = config.permits_db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = PermitStore::open(&config.permits_db_path)?;
        let ledger = DeliveryLedger::new(&store)?;
        let index = Arc::new(EmbeddingIndex::new(
            &config.rag_index_dir,
            store.clone(),
            Embedder::new(EmbeddingConfig::default()),
            config.batch_size,
        ));
        match index.load() {
            Ok(loaded) => info!(loaded, "index load at startup"),
            Err(err) => warn!(error = %err, "index unusable at startup; next cycle rebuilds"),
        }
        let matcher = ClientMatcher::new(
            store.clone(),
            Arc::clone(&index),
            MatchSettings {
                pool_limit: 1000,
                per_client_top_k: config.per_client_top_k,
            },
        );
        Ok(Self {
            config,
            store,
            ledger,
            index,
            matcher,
            directory,
            deliverer,
            scrapers,
            stage: StdMutex::new(CycleStage::Idle),
            cycle_gate: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &PermitStore {
        &self.store
    }

    pub fn ledger(&self) -> &DeliveryLedger {
        &self.ledger
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    /// Stage the engine is currently in.
    pub fn stage(&self) -> CycleStage {
        self.stage
            .lock()
            .map(|stage| *stage)
            .unwrap_or(CycleStage::Idle)
    }

    pub fn status(&self) -> Result<StatusReport, CycleError> {
        Ok(StatusReport {
            stage: self.stage(),
            permits: self.store.count()?,
            ledger_rows: self.ledger.len()?,
            index: self.index.status(),
        })
    }

    fn set_stage(&self, next: CycleStage) {
        if let Ok(mut stage) = self.stage.lock() {
            *stage = next;
        }
    }

    /// Run one full cycle. A cycle already in flight rejects the caller
    /// with [`CycleError::Busy`]; timed and on-demand triggers share this
    /// single gate.
    pub async fn run_cycle(&self, cancel: &CancelToken) -> Result<CycleSummary, CycleError> {
        let Ok(_exclusive) = self.cycle_gate.try_lock() else {
            return Err(CycleError::Busy);
        };
        let result = self.run_cycle_inner(cancel).await;
        self.set_stage(CycleStage::Idle);
        result
    }

    async fn run_cycle_inner(&self, cancel: &CancelToken) -> Result<CycleSummary, CycleError> {
        let mut summary = CycleSummary {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        self.set_stage(CycleStage::Scraping);
        summary.sources = self.scrape_all().await;
        if cancel.is_cancelled() {
            summary.cancelled_at = Some(CycleStage::Scraping);
            return Ok(summary);
        }

        self.set_stage(CycleStage::Reindexing);
        summary.reindex = Some(self.reindex());
        if cancel.is_cancelled() {
            summary.cancelled_at = Some(CycleStage::Reindexing);
            return Ok(summary);
        }

        // Client snapshot: read once, never re-read within the cycle.
        self.set_stage(CycleStage::Matching);
        let clients = match self.directory.list_clients(&ClientSelection::active()) {
            Ok(clients) => clients,
            Err(err) => {
                error!(error = %err, "client snapshot failed; aborting cycle");
                summary.fatal = Some(err.to_string());
                return Ok(summary);
            }
        };
        let (raw, mut failed_clients) = self.match_all(&clients, &MatchOverrides::default());
        if cancel.is_cancelled() {
            summary.cancelled_at = Some(CycleStage::Matching);
            return Ok(summary);
        }

        self.set_stage(CycleStage::Resolving);
        let resolved = match resolve(&raw) {
            Ok(resolved) => resolved,
            Err(err) => {
                error!(error = %err, "resolver invariant violated; nothing will be delivered");
                summary.fatal = Some(err.to_string());
                return Ok(summary);
            }
        };
        let mut gated = self.apply_delivery_gates(resolved)?;

        // Zero deliverable rows: one relaxed retry (empty query, no
        // exclusivity, doubled cap), still behind the ledger and the
        // phone gate.
        if gated.values().map(|a| a.sets.semantic.len()).sum::<usize>() == 0
            && !clients.is_empty()
        {
            info!("no deliverable rows after gating; running relaxed pass");
            summary.relaxed_pass = true;
            let relaxed = MatchOverrides {
                query: Some(String::new()),
                use_client_prefs: false,
                per_client_top_k: Some(self.config.per_client_top_k.saturating_mul(2)),
                ..Default::default()
            };
            let (relaxed_raw, relaxed_failures) = self.match_all(&clients, &relaxed);
            failed_clients.extend(relaxed_failures);
            gated = self.apply_delivery_gates(relaxed_raw)?;
        }

        self.set_stage(CycleStage::Delivering);
        let mut confirmed: Vec<(i64, Vec<i64>)> = Vec::new();
        for (client_id, assignment) in &gated {
            let semantic_ids: Vec<i64> = assignment
                .sets
                .semantic
                .iter()
                .map(|s| s.permit.id)
                .collect();
            let mut outcome = ClientOutcome {
                client_id: *client_id,
                name: assignment.client.name.clone(),
                rows: semantic_ids.len(),
                delivered: false,
                error: None,
            };

            let nothing_to_send = assignment.sets.inclusion.is_empty()
                && assignment.sets.exclusion.is_empty()
                && semantic_ids.is_empty();
            if nothing_to_send {
                summary.clients.push(outcome);
                continue;
            }

            match build_reports(&assignment.client, &assignment.sets) {
                Ok(reports) => match self.deliverer.deliver(&assignment.client, &reports).await {
                    Ok(_) => {
                        outcome.delivered = true;
                        confirmed.push((*client_id, semantic_ids));
                    }
                    Err(err) => {
                        warn!(client_id, error = %err, "delivery failed; rows retried next cycle");
                        outcome.error = Some(err.to_string());
                    }
                },
                Err(err) => {
                    warn!(client_id, error = %err, "report build failed");
                    outcome.error = Some(err.to_string());
                }
            }
            summary.clients.push(outcome);
        }
        for (client_id, name, err) in failed_clients {
            summary.clients.push(ClientOutcome {
                client_id,
                name,
                rows: 0,
                delivered: false,
                error: Some(err),
            });
        }

        // Recording runs even if cancellation arrived during delivery:
        // the writes are idempotent and skipping them risks redelivery.
        self.set_stage(CycleStage::Recording);
        for (client_id, permit_ids) in confirmed {
            if let Err(err) = self.ledger.record(client_id, &permit_ids) {
                warn!(client_id, error = %err, "ledger record failed; rows will redeliver until resolved");
            }
        }

        info!(
            sources = summary.sources.len(),
            clients = summary.clients.len(),
            rows = summary.total_rows(),
            relaxed = summary.relaxed_pass,
            "cycle complete"
        );
        Ok(summary)
    }

    /// Fan out one scrape per configured source, each under the
    /// per-request timeout. A failing source contributes zero rows and an
    /// error entry; the cycle always continues.
    async fn scrape_all(&self) -> Vec<SourceOutcome> {
        let today = Utc::now().date_naive();
        let mut pending = Vec::new();
        for source in &self.config.sources {
            let Some(scraper) = self.scrapers.get(&source.name) else {
                pending.push((source.name.clone(), None));
                continue;
            };
            let scraper = Arc::clone(scraper);
            let start = today - chrono::Duration::days(i64::from(source.window_days) - 1);
            let per_request = self.config.scrape_timeout();
            pending.push((
                source.name.clone(),
                Some(tokio::spawn(async move {
                    match timeout(per_request, scraper.scrape(start, today)).await {
                        Ok(Ok(rows)) => Ok(rows),
                        Ok(Err(err)) => Err(err.to_string()),
                        Err(_) => Err(format!(
                            "source timed out after {}s",
                            per_request.as_secs()
                        )),
                    }
                })),
            ));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (source, handle) in pending {
            let outcome = match handle {
                None => SourceOutcome {
                    source: source.clone(),
                    fetched: 0,
                    inserted: 0,
                    error: Some("no scraper registered for source".into()),
                },
                Some(handle) => match handle.await {
                    Ok(Ok(rows)) => {
                        let fetched = rows.len();
                        match self.store.insert_raw(&source, &rows) {
                            Ok(insert) => SourceOutcome {
                                source: source.clone(),
                                fetched,
                                inserted: insert.inserted,
                                error: None,
                            },
                            Err(err) => SourceOutcome {
                                source: source.clone(),
                                fetched,
                                inserted: 0,
                                error: Some(err.to_string()),
                            },
                        }
                    }
                    Ok(Err(message)) => SourceOutcome {
                        source: source.clone(),
                        fetched: 0,
                        inserted: 0,
                        error: Some(message),
                    },
                    Err(join_err) => SourceOutcome {
                        source: source.clone(),
                        fetched: 0,
                        inserted: 0,
                        error: Some(join_err.to_string()),
                    },
                },
            };
            if let Some(problem) = &outcome.error {
                warn!(source = %outcome.source, error = %problem, "source contributed no rows");
            } else {
                info!(
                    source = %outcome.source,
                    fetched = outcome.fetched,
                    inserted = outcome.inserted,
                    "source scraped"
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Incremental refresh when artifacts exist and lag the catalog; full
    /// build otherwise. A missing or corrupt artifact triple escalates to
    /// a full build.
    fn reindex(&self) -> ReindexOutcome {
        let full_build = || match self.index.build() {
            Ok(report) => ReindexOutcome::Full {
                built: report.built,
            },
            Err(err) => {
                warn!(error = %err, "full index build failed");
                ReindexOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        if !self.index.artifacts_present() {
            return full_build();
        }
        match self.index.load() {
            Ok(true) => {}
            Ok(false) => return full_build(),
            Err(IndexError::Inconsistent(detail)) => {
                warn!(%detail, "index artifacts inconsistent; forcing full rebuild");
                return full_build();
            }
            Err(err) => {
                return ReindexOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }

        let vectors = self.index.status().vectors;
        let permits = match self.store.count() {
            Ok(count) => count,
            Err(err) => {
                return ReindexOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        if vectors >= permits {
            return ReindexOutcome::Skipped { vectors };
        }

        let max_id = match self.store.max_id() {
            Ok(max_id) => max_id,
            Err(err) => {
                return ReindexOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };
        let candidates: Vec<i64> = (1..=max_id).collect();
        match self.index.build_incremental(&candidates) {
            Ok(report) => ReindexOutcome::Incremental {
                added: report.added,
            },
            Err(IndexError::Missing(_)) => full_build(),
            Err(err) => {
                warn!(error = %err, "incremental index build failed");
                ReindexOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Run the matcher for every client in the snapshot. Failures are
    /// contained: the client is skipped and reported, the cycle goes on.
    fn match_all(
        &self,
        clients: &[ClientProfile],
        overrides: &MatchOverrides,
    ) -> (Assignments, Vec<(i64, String, String)>) {
        let mut raw = Assignments::new();
        let mut failures = Vec::new();
        for client in clients {
            match self.matcher.match_client(client, overrides) {
                Ok(sets) => {
                    raw.insert(
                        client.id,
                        ClientAssignment {
                            client: client.clone(),
                            sets,
                        },
                    );
                }
                Err(err) => {
                    warn!(client_id = client.id, error = %err, "matcher failed for client");
                    failures.push((client.id, client.name.clone(), err.to_string()));
                }
            }
        }
        (raw, failures)
    }

    /// Ledger dedup then the contact-phone gate, per client.
    fn apply_delivery_gates(
        &self,
        assignments: Assignments,
    ) -> Result<Assignments, CycleError> {
        let mut gated = Assignments::new();
        for (client_id, mut assignment) in assignments {
            let ids: Vec<i64> = assignment
                .sets
                .semantic
                .iter()
                .map(|s| s.permit.id)
                .collect();
            let unsent: HashSet<i64> = self
                .ledger
                .filter_unsent(client_id, &ids)?
                .into_iter()
                .collect();
            assignment
                .sets
                .semantic
                .retain(|s| unsent.contains(&s.permit.id));
            assignment.sets = apply_phone_gate(&assignment.sets);
            gated.insert(client_id, assignment);
        }
        Ok(gated)
    }
}
