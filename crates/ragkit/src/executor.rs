// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Pipeline execution: sequential and concurrent scheduling, retries,
//! graceful degradation, wall-clock timeout, and checkpoint resumption.
//!
//! Execution walks the graph in topological order. In concurrent mode the
//! engine keeps a ready set of nodes whose dependencies are all satisfied and
//! runs at most `max_concurrency` of them at once; state mutation stays on
//! the scheduler task, so node tasks never share the result maps.
//!
//! # Example
//!
//! ```rust
//! use ragkit::{Pipeline, ExecuteOptions, NodeInput, NodeContext};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ragkit::Result<()> {
//! let mut pipeline = Pipeline::new();
//! pipeline.add_node("double", |input: NodeInput, _ctx: NodeContext| async move {
//!     let n = input.into_value().as_i64().unwrap_or(0);
//!     Ok(json!(n * 2))
//! })?;
//! let result = pipeline.execute(ExecuteOptions::new().with_seed(json!(21))).await?;
//! assert_eq!(result, json!(42));
//! # Ok(())
//! # }
//! ```

use crate::checkpoint::Checkpoint;
use crate::error::{Error, NodeError, Result};
use crate::graph::Pipeline;
use crate::node::{CancelToken, NodeContext, NodeEntry, NodeInput, NodeState};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Configuration bag for one [`Pipeline::execute`] invocation.
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Initial input bound to source nodes. `Null` when absent.
    pub seed: Option<Value>,
    /// Retry failed nodes before recording their error.
    pub retry_failed_nodes: bool,
    /// Additional attempts per node when retrying.
    pub max_retries: u32,
    /// Record node errors and keep executing unaffected branches.
    pub graceful_degradation: bool,
    /// Nodes whose failure (or skip) fails the whole execution even under
    /// graceful degradation.
    pub required_nodes: Vec<String>,
    /// Checkpoint id used for automatic snapshots and resumption.
    pub checkpoint_id: Option<String>,
    /// Rehydrate results from the stored checkpoint before executing.
    pub resume_from_checkpoint: bool,
    /// Results injected from an externally held checkpoint.
    pub external_checkpoint_data: Option<HashMap<String, Value>>,
    /// Wall-clock bound for the whole execution.
    pub timeout: Option<Duration>,
    /// Maximum node tasks in flight; `None` or 1 means sequential.
    pub max_concurrency: Option<usize>,
    /// Snapshot `(results, errors)` after each successful node.
    pub enable_checkpoints: bool,
    /// External cancellation signal; a fresh token is created when absent.
    pub cancel_token: Option<CancelToken>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            seed: None,
            retry_failed_nodes: false,
            max_retries: 3,
            graceful_degradation: false,
            required_nodes: Vec::new(),
            checkpoint_id: None,
            resume_from_checkpoint: false,
            external_checkpoint_data: None,
            timeout: None,
            max_concurrency: None,
            enable_checkpoints: false,
            cancel_token: None,
        }
    }
}

impl ExecuteOptions {
    /// Options with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Value) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Enable per-node retry with the given attempt budget.
    #[must_use]
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry_failed_nodes = true;
        self.max_retries = max_retries;
        self
    }

    /// Enable graceful degradation.
    #[must_use]
    pub fn with_graceful_degradation(mut self) -> Self {
        self.graceful_degradation = true;
        self
    }

    /// Mark nodes as required.
    #[must_use]
    pub fn with_required_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Enable automatic checkpointing under the given id.
    #[must_use]
    pub fn with_checkpointing(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self.enable_checkpoints = true;
        self
    }

    /// Resume from the stored checkpoint with the given id.
    #[must_use]
    pub fn with_resume(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self.resume_from_checkpoint = true;
        self
    }

    /// Set the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the concurrency limit.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    /// Attach an external cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// True when any option forces the full results map as the return shape.
    fn wants_results_map(&self) -> bool {
        self.retry_failed_nodes
            || self.graceful_degradation
            || self.checkpoint_id.is_some()
            || !self.required_nodes.is_empty()
    }
}

/// Mutable state owned by one execution invocation.
#[derive(Default)]
struct ExecState {
    results: HashMap<String, Value>,
    errors: HashMap<String, String>,
    error_list: Vec<NodeError>,
    retry_counts: HashMap<String, u32>,
    node_states: HashMap<String, NodeState>,
}

impl ExecState {
    fn record_success(&mut self, id: &str, value: Value) {
        self.node_states.insert(id.to_string(), NodeState::Succeeded);
        self.results.insert(id.to_string(), value);
    }

    fn record_failure(&mut self, id: &str, message: String) {
        self.node_states.insert(id.to_string(), NodeState::Failed);
        self.errors.insert(id.to_string(), message.clone());
        self.error_list.push(NodeError {
            node_id: id.to_string(),
            message,
        });
    }
}

impl Pipeline {
    /// Execute the pipeline with a seed and defaults everywhere else.
    pub async fn run(&self, seed: Value) -> Result<Value> {
        self.execute(ExecuteOptions::new().with_seed(seed)).await
    }

    /// Execute the pipeline.
    ///
    /// Returns the full results map (as a JSON object) when any of
    /// `retry_failed_nodes`, `graceful_degradation`, `checkpoint_id`, or
    /// `required_nodes` is active; otherwise the single sink's value, or an
    /// object keyed by sink id when there are several sinks.
    ///
    /// Terminal errors come back wrapped in [`Error::ExecutionFailed`] with
    /// the typed inner variant preserved.
    pub async fn execute(&self, options: ExecuteOptions) -> Result<Value> {
        match self.execute_inner(&options).await {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into_execution_failed()),
        }
    }

    /// Re-execute from checkpointed state.
    ///
    /// Results from the checkpoint are trusted as-is; only nodes without a
    /// stored result whose dependencies are satisfied run again. Nodes whose
    /// dependencies are still missing are skipped silently. Always returns
    /// the full results map.
    pub async fn resume(&self, checkpoint: &Checkpoint, seed: Option<Value>) -> Result<Value> {
        let options = ExecuteOptions {
            seed,
            graceful_degradation: true,
            external_checkpoint_data: Some(checkpoint.results.clone()),
            ..ExecuteOptions::default()
        };
        self.execute(options).await
    }

    async fn execute_inner(&self, options: &ExecuteOptions) -> Result<Value> {
        self.validate()?;
        for id in &options.required_nodes {
            if !self.nodes.contains_key(id) {
                return Err(Error::UnknownNode { id: id.clone() });
            }
        }

        let order = self.topo_sort()?;
        let mut state = ExecState::default();
        for id in &order {
            state.node_states.insert(id.clone(), NodeState::Pending);
        }

        // Rehydrate before scheduling so resumed nodes count as satisfied.
        if options.resume_from_checkpoint {
            if let Some(checkpoint_id) = &options.checkpoint_id {
                if let Some(checkpoint) = self.checkpoints.load(checkpoint_id).await? {
                    state.results.extend(checkpoint.results);
                    state.errors.extend(checkpoint.errors);
                }
            }
        }
        if let Some(external) = &options.external_checkpoint_data {
            state
                .results
                .extend(external.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let seed = options.seed.clone().unwrap_or(Value::Null);
        let cancel = options.cancel_token.clone().unwrap_or_default();
        let deadline = options
            .timeout
            .map(|t| tokio::time::Instant::now() + t);
        let started = std::time::Instant::now();

        let concurrency = options.max_concurrency.unwrap_or(1);
        if concurrency > 1 {
            self.execute_concurrent(
                &order, &mut state, options, &seed, &cancel, deadline, started, concurrency,
            )
            .await?;
        } else {
            self.execute_sequential(&order, &mut state, options, &seed, &cancel, deadline, started)
                .await?;
        }

        // Required nodes must have produced a result, whether they failed
        // outright or were skipped behind a failed dependency.
        let missing_required: Vec<&String> = options
            .required_nodes
            .iter()
            .filter(|id| !state.results.contains_key(*id))
            .collect();
        if !missing_required.is_empty() {
            let mut errors = state.error_list.clone();
            if errors.is_empty() {
                for id in missing_required {
                    errors.push(NodeError {
                        node_id: id.clone(),
                        message: "required node produced no result".to_string(),
                    });
                }
            }
            return Err(Error::Aggregate { errors });
        }

        self.build_output(&state, options)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_sequential(
        &self,
        order: &[String],
        state: &mut ExecState,
        options: &ExecuteOptions,
        seed: &Value,
        cancel: &CancelToken,
        deadline: Option<tokio::time::Instant>,
        started: std::time::Instant,
    ) -> Result<()> {
        for id in order {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if state.results.contains_key(id) {
                state.node_states.insert(id.clone(), NodeState::Succeeded);
                continue;
            }
            let entry = &self.nodes[id];
            let satisfied = entry
                .inputs
                .iter()
                .all(|dep| state.results.contains_key(dep));
            if !satisfied {
                // Only reachable when a dependency failed or was skipped
                // under degradation or resume.
                state.node_states.insert(id.clone(), NodeState::Skipped);
                debug!(node = %id, "Skipping node with unavailable dependencies");
                continue;
            }
            if let Some(dl) = deadline {
                if tokio::time::Instant::now() >= dl {
                    cancel.cancel();
                    return Err(Error::ExecutionTimeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }

            let input = input_for(entry, seed, &state.results);
            state.node_states.insert(id.clone(), NodeState::Running);
            let (attempts, outcome) =
                run_with_retry(entry, input, options, cancel, deadline, started).await;
            if attempts > 0 {
                state.retry_counts.insert(id.clone(), attempts);
            }
            match outcome {
                Ok(value) => {
                    state.record_success(id, value);
                    self.autosave(options, state).await?;
                }
                Err(timeout @ Error::ExecutionTimeout { .. }) => return Err(timeout),
                Err(cancelled @ Error::Cancelled) => return Err(cancelled),
                Err(err) => {
                    let message = err.to_string();
                    state.record_failure(id, message.clone());
                    if options.required_nodes.contains(id) {
                        return Err(Error::Aggregate {
                            errors: state.error_list.clone(),
                        });
                    }
                    if !options.graceful_degradation {
                        return Err(Error::NodeFailure {
                            id: id.clone(),
                            message,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_concurrent(
        &self,
        order: &[String],
        state: &mut ExecState,
        options: &ExecuteOptions,
        seed: &Value,
        cancel: &CancelToken,
        deadline: Option<tokio::time::Instant>,
        started: std::time::Instant,
        concurrency: usize,
    ) -> Result<()> {
        // Insertion index breaks ties within the ready set deterministically.
        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut unresolved: HashMap<String, usize> = HashMap::new();
        let mut ready: Vec<String> = Vec::new();

        for id in order {
            if state.results.contains_key(id) {
                state.node_states.insert(id.clone(), NodeState::Succeeded);
                continue;
            }
            let entry = &self.nodes[id];
            // A rehydrated error does not resolve a dependency: the failed
            // node re-executes this run (or is skipped), and its dependents
            // settle through the normal cascade.
            let pending = entry
                .inputs
                .iter()
                .filter(|dep| !state.results.contains_key(*dep))
                .count();
            if pending > 0 {
                unresolved.insert(id.clone(), pending);
            } else {
                state.node_states.insert(id.clone(), NodeState::Ready);
                ready.push(id.clone());
            }
        }

        let mut join_set: JoinSet<(String, u32, Result<Value>)> = JoinSet::new();
        let mut stop = false;
        let mut required_failed = false;

        loop {
            while !stop && join_set.len() < concurrency && !ready.is_empty() {
                if cancel.is_cancelled() {
                    stop = true;
                    break;
                }
                let next = ready
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, id)| position.get(id.as_str()).copied().unwrap_or(usize::MAX))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                let id = ready.swap_remove(next);
                let entry = &self.nodes[&id];
                let input = input_for(entry, seed, &state.results);
                let run = entry.run.clone();
                let task_cancel = cancel.clone();
                let retries_allowed = if options.retry_failed_nodes {
                    options.max_retries
                } else {
                    0
                };
                state.node_states.insert(id.clone(), NodeState::Running);
                join_set.spawn(async move {
                    let mut attempt = 0u32;
                    loop {
                        if task_cancel.is_cancelled() {
                            return (id, attempt, Err(Error::Cancelled));
                        }
                        let ctx = NodeContext {
                            cancel: task_cancel.clone(),
                            attempt,
                        };
                        match run(input.clone(), ctx).await {
                            Ok(value) => return (id, attempt, Ok(value)),
                            Err(err) => {
                                if attempt >= retries_allowed {
                                    return (id, attempt, Err(err));
                                }
                                attempt += 1;
                                warn!(node = %id, attempt, error = %err, "Node failed, retrying");
                            }
                        }
                    }
                });
            }

            if join_set.is_empty() {
                break;
            }

            let joined = if let Some(dl) = deadline {
                tokio::select! {
                    joined = join_set.join_next() => joined,
                    () = tokio::time::sleep_until(dl) => {
                        cancel.cancel();
                        // Cooperative: let in-flight run functions observe
                        // the signal and settle before failing.
                        while join_set.join_next().await.is_some() {}
                        return Err(Error::ExecutionTimeout {
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        });
                    }
                }
            } else {
                join_set.join_next().await
            };

            let Some(join_result) = joined else {
                continue;
            };
            let Ok((id, attempts, outcome)) = join_result else {
                warn!("Node task aborted unexpectedly");
                stop = true;
                continue;
            };

            if attempts > 0 {
                state.retry_counts.insert(id.clone(), attempts);
            }
            match outcome {
                Ok(value) => {
                    state.record_success(&id, value);
                    self.autosave(options, state).await?;
                    let mut terminal = vec![id];
                    self.cascade_skips(&mut terminal, state, &mut unresolved, &mut ready);
                }
                Err(Error::Cancelled) => {
                    // External cancellation; not a node failure.
                    stop = true;
                }
                Err(err) => {
                    state.record_failure(&id, err.to_string());
                    if options.required_nodes.contains(&id) {
                        required_failed = true;
                        stop = true;
                    } else if !options.graceful_degradation {
                        stop = true;
                    }
                    let mut terminal = vec![id];
                    self.cascade_skips(&mut terminal, state, &mut unresolved, &mut ready);
                }
            }
        }

        if required_failed {
            return Err(Error::Aggregate {
                errors: state.error_list.clone(),
            });
        }
        if !options.graceful_degradation && !state.error_list.is_empty() {
            if state.error_list.len() >= 2 {
                return Err(Error::Aggregate {
                    errors: state.error_list.clone(),
                });
            }
            let failure = state.error_list[0].clone();
            return Err(Error::NodeFailure {
                id: failure.node_id,
                message: failure.message,
            });
        }
        if cancel.is_cancelled() && state.error_list.is_empty() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Propagate terminal node states: dependents with all dependencies
    /// resolved either join the ready set (every dependency has a result) or
    /// are skipped, which recursively resolves their own dependents.
    fn cascade_skips(
        &self,
        work: &mut Vec<String>,
        state: &mut ExecState,
        unresolved: &mut HashMap<String, usize>,
        ready: &mut Vec<String>,
    ) {
        while let Some(done) = work.pop() {
            for dependent in &self.nodes[&done].outputs {
                let Some(remaining) = unresolved.get_mut(dependent) else {
                    continue;
                };
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 {
                    continue;
                }
                unresolved.remove(dependent);
                let all_results = self.nodes[dependent]
                    .inputs
                    .iter()
                    .all(|dep| state.results.contains_key(dep));
                if all_results {
                    state
                        .node_states
                        .insert(dependent.clone(), NodeState::Ready);
                    ready.push(dependent.clone());
                } else {
                    state
                        .node_states
                        .insert(dependent.clone(), NodeState::Skipped);
                    work.push(dependent.clone());
                }
            }
        }
    }

    async fn autosave(&self, options: &ExecuteOptions, state: &ExecState) -> Result<()> {
        if !options.enable_checkpoints {
            return Ok(());
        }
        let Some(checkpoint_id) = &options.checkpoint_id else {
            return Ok(());
        };
        self.checkpoints
            .save(Checkpoint::new(
                checkpoint_id,
                state.results.clone(),
                state.errors.clone(),
            ))
            .await
    }

    fn build_output(&self, state: &ExecState, options: &ExecuteOptions) -> Result<Value> {
        if options.wants_results_map() {
            return Ok(Value::Object(
                state
                    .results
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ));
        }
        let sinks = self.sink_ids();
        match sinks.len() {
            0 => Err(Error::NoSinkNodes),
            1 => Ok(state
                .results
                .get(sinks[0])
                .cloned()
                .unwrap_or(Value::Null)),
            _ => Ok(Value::Object(
                sinks
                    .iter()
                    .filter_map(|id| {
                        state
                            .results
                            .get(*id)
                            .map(|v| ((*id).to_string(), v.clone()))
                    })
                    .collect(),
            )),
        }
    }
}

fn input_for(
    entry: &NodeEntry,
    seed: &Value,
    results: &HashMap<String, Value>,
) -> NodeInput {
    if entry.inputs.is_empty() {
        NodeInput::Seed(seed.clone())
    } else {
        NodeInput::Dependencies(
            entry
                .inputs
                .iter()
                .map(|dep| {
                    (
                        dep.clone(),
                        results.get(dep).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect(),
        )
    }
}

/// Run one node with its retry budget, honoring deadline and cancellation
/// between attempts. Returns the retry count alongside the outcome.
async fn run_with_retry(
    entry: &NodeEntry,
    input: NodeInput,
    options: &ExecuteOptions,
    cancel: &CancelToken,
    deadline: Option<tokio::time::Instant>,
    started: std::time::Instant,
) -> (u32, Result<Value>) {
    let retries_allowed = if options.retry_failed_nodes {
        options.max_retries
    } else {
        0
    };
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return (attempt, Err(Error::Cancelled));
        }
        let ctx = NodeContext {
            cancel: cancel.clone(),
            attempt,
        };
        let mut fut = (entry.run)(input.clone(), ctx);
        let outcome = match deadline {
            Some(dl) => {
                tokio::select! {
                    res = &mut fut => res,
                    () = tokio::time::sleep_until(dl) => {
                        cancel.cancel();
                        // Cooperative cancellation: the run function gets to
                        // observe the signal and settle.
                        let _ = fut.await;
                        return (
                            attempt,
                            Err(Error::ExecutionTimeout {
                                elapsed_ms: started.elapsed().as_millis() as u64,
                            }),
                        );
                    }
                }
            }
            None => fut.await,
        };
        match outcome {
            Ok(value) => return (attempt, Ok(value)),
            Err(err) => {
                if attempt >= retries_allowed {
                    return (attempt, Err(err));
                }
                attempt += 1;
                warn!(node = %entry.id, attempt, error = %err, "Node failed, retrying");
            }
        }
    }
}
