//! Batch delivery of a ranked list to the product matcher.
//!
//! ```text
//! Idle → Dispatching(i) → AwaitingResult(i) → Merging(i) → Dispatching(i+1) → … → Done
//!                              └──────────────────┴──→ Failed(i)
//! ```
//!
//! Observers see the full run state after every transition, so a consumer can
//! render matches as each batch lands.
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::{
    error::AppResult,
    models::{Batch, InterestTerm, MatchResult, RankedList, SeedMatch},
    services::{pacing::Pacer, providers::ProductMatcher},
};

/// Products requested per seed term
pub const SEED_TOP_K: usize = 10;

/// Splits a ranked list into contiguous batches of at most `batch_size`
/// records, in rank order. A `batch_size` of zero is treated as one.
pub fn partition(list: &RankedList, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    list.records()
        .chunks(batch_size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            start_index: i * batch_size,
            records: chunk.to_vec(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "batch", rename_all = "snake_case")]
pub enum DeliveryState {
    Idle,
    Dispatching(usize),
    AwaitingResult(usize),
    Merging(usize),
    Done,
    Failed(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed_batches: usize,
    pub total_batches: usize,
    pub percent: u8,
    pub delivered_records: usize,
    pub total_records: usize,
    pub cumulative_products: usize,
}

impl Progress {
    fn new(total_batches: usize, total_records: usize) -> Self {
        Self {
            total_batches,
            total_records,
            percent: if total_records == 0 { 100 } else { 0 },
            ..Self::default()
        }
    }

    fn record_batch(&mut self, records: usize, products: usize) {
        self.completed_batches += 1;
        self.delivered_records += records;
        self.cumulative_products += products;
        self.percent = if self.total_records == 0 {
            100
        } else {
            ((self.delivered_records * 100 + self.total_records / 2) / self.total_records) as u8
        };
    }
}

/// Transient per-run state, mutated only by the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRunState {
    pub state: DeliveryState,
    /// Accumulated matches, appended batch by batch
    pub matches: Vec<MatchResult>,
    /// Rank index of the next record to dispatch
    pub cursor: usize,
    pub progress: Progress,
    pub message: String,
    pub error: Option<String>,
}

impl PipelineRunState {
    fn new(total_batches: usize, total_records: usize) -> Self {
        Self {
            state: DeliveryState::Idle,
            matches: Vec::new(),
            cursor: 0,
            progress: Progress::new(total_batches, total_records),
            message: "Starting product search".to_string(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == DeliveryState::Done
    }

    /// Index of the failed batch, if the run failed
    pub fn failed_batch(&self) -> Option<usize> {
        match self.state {
            DeliveryState::Failed(batch) => Some(batch),
            _ => None,
        }
    }
}

/// Sees the run state after every transition
pub trait DeliveryObserver: Send + Sync {
    fn on_transition(&self, state: &PipelineRunState);

    /// Seed-term matches, reported once before delivery starts
    fn on_seed_matches(&self, _matches: &[SeedMatch]) {}
}

/// Discards transitions
pub struct NoopObserver;

impl DeliveryObserver for NoopObserver {
    fn on_transition(&self, _state: &PipelineRunState) {}
}

/// What a streaming consumer receives per transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryUpdate {
    pub state: DeliveryState,
    pub progress: Progress,
    pub message: String,
    pub error: Option<String>,
    /// Matches merged since the previous update
    pub new_matches: Vec<MatchResult>,
}

/// Everything a [`ChannelObserver`] forwards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunEvent {
    SeedMatches(Vec<SeedMatch>),
    Delivery(DeliveryUpdate),
}

/// Forwards transitions over a channel, sending each merged match once
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<RunEvent>,
    sent: std::sync::Mutex<usize>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        Self {
            tx,
            sent: std::sync::Mutex::new(0),
        }
    }
}

impl DeliveryObserver for ChannelObserver {
    fn on_transition(&self, state: &PipelineRunState) {
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let new_matches = state.matches[(*sent).min(state.matches.len())..].to_vec();
        *sent = state.matches.len();

        let update = DeliveryUpdate {
            state: state.state,
            progress: state.progress,
            message: state.message.clone(),
            error: state.error.clone(),
            new_matches,
        };

        // The receiver going away only means nobody is listening any more.
        let _ = self.tx.send(RunEvent::Delivery(update));
    }

    fn on_seed_matches(&self, matches: &[SeedMatch]) {
        let _ = self.tx.send(RunEvent::SeedMatches(matches.to_vec()));
    }
}

/// Drives ranked batches through the matcher one at a time
pub struct BatchDeliveryController {
    matcher: Arc<dyn ProductMatcher>,
    pacer: Arc<dyn Pacer>,
    batch_size: usize,
    top_k: usize,
}

impl BatchDeliveryController {
    pub fn new(
        matcher: Arc<dyn ProductMatcher>,
        pacer: Arc<dyn Pacer>,
        batch_size: usize,
        top_k: usize,
    ) -> Self {
        Self {
            matcher,
            pacer,
            batch_size: batch_size.max(1),
            top_k,
        }
    }

    /// One unpaced matcher call for the bare seed terms
    #[instrument(skip_all, fields(terms = terms.len()))]
    pub async fn match_seed_terms(&self, terms: &[InterestTerm]) -> AppResult<Vec<SeedMatch>> {
        let matches = self.matcher.match_seed_terms(terms, SEED_TOP_K).await?;
        tracing::info!(
            products = matches.iter().map(|m| m.matches.len()).sum::<usize>(),
            "Seed terms matched"
        );
        Ok(matches)
    }

    /// Delivers the whole list; returns the terminal run state.
    ///
    /// A failed batch stops the run. Matches merged before the failure are kept.
    #[instrument(skip_all, fields(records = list.len(), batch_size = self.batch_size))]
    pub async fn deliver(
        &self,
        list: &RankedList,
        observer: &dyn DeliveryObserver,
    ) -> PipelineRunState {
        let batches = partition(list, self.batch_size);
        let total = batches.len();
        let mut run = PipelineRunState::new(total, list.len());
        observer.on_transition(&run);

        for (i, batch) in batches.iter().enumerate() {
            let number = i + 1;
            run.state = DeliveryState::Dispatching(i);
            run.message = format!("Processing batch {}/{}", number, total);
            observer.on_transition(&run);

            tracing::debug!(
                batch = number,
                total,
                start_index = batch.start_index,
                size = batch.records.len(),
                "Dispatching batch"
            );

            run.state = DeliveryState::AwaitingResult(i);
            observer.on_transition(&run);

            let results = match self.matcher.match_batch(&batch.records, self.top_k).await {
                Ok(results) if results.len() == batch.records.len() => results,
                Ok(results) => {
                    let error = format!(
                        "Malformed matching response: {} results for {} records",
                        results.len(),
                        batch.records.len()
                    );
                    return self.fail(run, i, error, observer);
                }
                Err(e) => return self.fail(run, i, e.to_string(), observer),
            };

            run.state = DeliveryState::Merging(i);
            let products: usize = results.iter().map(|r| r.matches.len()).sum();
            run.matches.extend(results);
            run.cursor = batch.start_index + batch.records.len();
            run.progress.record_batch(batch.records.len(), products);
            run.message = format!(
                "Batch {}/{} complete ({}%), {} products total",
                number, total, run.progress.percent, run.progress.cumulative_products
            );
            observer.on_transition(&run);

            tracing::info!(
                batch = number,
                total,
                products,
                cumulative_products = run.progress.cumulative_products,
                "Batch merged"
            );

            if number < total {
                self.pacer.pause().await;
            }
        }

        run.state = DeliveryState::Done;
        run.message = if total == 0 {
            "No recommendations to match".to_string()
        } else {
            "All products loaded".to_string()
        };
        observer.on_transition(&run);

        run
    }

    fn fail(
        &self,
        mut run: PipelineRunState,
        batch: usize,
        error: String,
        observer: &dyn DeliveryObserver,
    ) -> PipelineRunState {
        tracing::error!(
            batch = batch + 1,
            total = run.progress.total_batches,
            partial_matches = run.matches.len(),
            error = %error,
            "Batch dispatch failed"
        );

        run.state = DeliveryState::Failed(batch);
        run.message = format!(
            "Error loading products at batch {}/{}",
            batch + 1,
            run.progress.total_batches
        );
        run.error = Some(error);
        observer.on_transition(&run);
        run
    }
}
