use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::workflow::{Executor, Message, SharedState, Workflow};

const DEFAULT_MAX_SUPERSTEPS: u32 = 100;

type EdgeCondition = dyn Fn(&Message) -> bool + Send + Sync;

/// Directed connection between two executors, fixed at build time.
#[derive(Clone)]
pub struct Edge {
    source: String,
    target: String,
    condition: Option<Arc<EdgeCondition>>,
}

impl Edge {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_conditional(&self) -> bool {
        self.condition.is_some()
    }

    /// Whether a message sent by the source travels along this edge.
    pub fn accepts(&self, message: &Message) -> bool {
        if message
            .target_id()
            .is_some_and(|target| target != self.target)
        {
            return false;
        }
        self.condition
            .as_ref()
            .is_none_or(|condition| condition(message))
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// Assembles executors and edges into a [`Workflow`].
///
/// Executors are registered implicitly by the edge methods. Registering two
/// different instances under one id is reported by `build`.
pub struct WorkflowBuilder {
    name: Option<String>,
    executors: Vec<Arc<dyn Executor>>,
    duplicate_ids: Vec<String>,
    edges: Vec<Edge>,
    start_id: Option<String>,
    max_supersteps: u32,
    shared_state: SharedState,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self {
            name: None,
            executors: Vec::new(),
            duplicate_ids: Vec::new(),
            edges: Vec::new(),
            start_id: None,
            max_supersteps: DEFAULT_MAX_SUPERSTEPS,
            shared_state: SharedState::new(),
        }
    }
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn add_executor(mut self, executor: &Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    pub fn add_edge(self, source: &Arc<dyn Executor>, target: &Arc<dyn Executor>) -> Self {
        self.push_edge(source, target, None)
    }

    /// Adds an edge that only carries messages for which `condition` holds.
    pub fn add_edge_with_condition<F>(
        self,
        source: &Arc<dyn Executor>,
        target: &Arc<dyn Executor>,
        condition: F,
    ) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.push_edge(source, target, Some(Arc::new(condition)))
    }

    /// Connects `source` to each of `targets`; every message is copied to all.
    pub fn add_fan_out_edges(
        mut self,
        source: &Arc<dyn Executor>,
        targets: &[Arc<dyn Executor>],
    ) -> Self {
        for target in targets {
            self = self.push_edge(source, target, None);
        }
        self
    }

    /// Connects the executors one after another.
    pub fn add_chain(mut self, executors: &[Arc<dyn Executor>]) -> Self {
        for pair in executors.windows(2) {
            self = self.push_edge(&pair[0], &pair[1], None);
        }
        if let [only] = executors {
            self.register(only);
        }
        self
    }

    pub fn set_start_executor(mut self, executor: &Arc<dyn Executor>) -> Self {
        self.register(executor);
        self.start_id = Some(executor.id().to_string());
        self
    }

    /// Upper bound on supersteps before a run fails with `DidNotConverge`.
    pub fn max_supersteps(mut self, max_supersteps: u32) -> Self {
        self.max_supersteps = max_supersteps;
        self
    }

    pub fn shared_state(mut self, shared_state: SharedState) -> Self {
        self.shared_state = shared_state;
        self
    }

    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let Some(start_id) = self.start_id else {
            return Err(WorkflowError::Config(
                "start executor must be set via WorkflowBuilder::set_start_executor(...)"
                    .to_string(),
            ));
        };

        if let Some(id) = self.duplicate_ids.first() {
            return Err(WorkflowError::Config(format!(
                "duplicate executor id registered: {id}"
            )));
        }

        if self.max_supersteps == 0 {
            return Err(WorkflowError::Config(
                "max_supersteps must be at least 1".to_string(),
            ));
        }

        let executors = self
            .executors
            .into_iter()
            .map(|executor| (executor.id().to_string(), executor))
            .collect::<HashMap<_, _>>();

        let mut edges: HashMap<String, Vec<Edge>> = HashMap::new();
        for edge in self.edges {
            check_edge_types(&executors, &edge)?;
            edges.entry(edge.source.clone()).or_default().push(edge);
        }

        tracing::debug!(
            start = %start_id,
            executors = executors.len(),
            "workflow built"
        );

        Ok(Workflow::new(
            self.name,
            executors,
            edges,
            start_id,
            self.max_supersteps,
            self.shared_state,
        ))
    }

    fn push_edge(
        mut self,
        source: &Arc<dyn Executor>,
        target: &Arc<dyn Executor>,
        condition: Option<Arc<EdgeCondition>>,
    ) -> Self {
        self.register(source);
        self.register(target);
        self.edges.push(Edge {
            source: source.id().to_string(),
            target: target.id().to_string(),
            condition,
        });
        self
    }

    fn register(&mut self, executor: &Arc<dyn Executor>) {
        match self
            .executors
            .iter()
            .find(|existing| existing.id() == executor.id())
        {
            Some(existing) if Arc::ptr_eq(existing, executor) => {}
            Some(_) => self.duplicate_ids.push(executor.id().to_string()),
            None => self.executors.push(Arc::clone(executor)),
        }
    }
}

/// Rejects edges whose source declares output types none of which the
/// target accepts.
fn check_edge_types(
    executors: &HashMap<String, Arc<dyn Executor>>,
    edge: &Edge,
) -> Result<(), WorkflowError> {
    let (Some(source), Some(target)) = (executors.get(&edge.source), executors.get(&edge.target))
    else {
        return Err(WorkflowError::UnknownExecutor(edge.target.clone()));
    };

    let sent = source.output_types();
    let accepted = target.input_types();
    if sent.is_empty() || sent.iter().any(|key| accepted.contains(key)) {
        return Ok(());
    }

    Err(WorkflowError::Config(format!(
        "edge {} -> {}: target accepts none of [{}]",
        edge.source,
        edge.target,
        sent.iter()
            .map(|key| key.name())
            .collect::<Vec<_>>()
            .join(", ")
    )))
}
