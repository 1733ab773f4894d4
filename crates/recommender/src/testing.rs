//! Deterministic fakes for the pipeline's capability traits

use crate::context::{GraphStore, LinkedNode};
use async_trait::async_trait;
use litgraph_common::bibliography::{BibliographicIndex, WorkIdentifier, WorkRecord};
use litgraph_common::db::models::Experiment;
use litgraph_common::db::Adjacency;
use litgraph_common::errors::{AppError, Result};
use litgraph_common::llm::{GenerationRequest, Generator};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Minimal work record with a canonical id, title and year
pub fn work(id: &str, title: &str, year: Option<i32>) -> WorkRecord {
    WorkRecord {
        id: id.to_string(),
        title: title.to_string(),
        year,
        venue: None,
        doi: None,
        url: format!("https://openalex.org/{}", id),
        cited_by_count: 0,
        is_open_access: false,
        abstract_text: String::new(),
    }
}

// ============================================================================
// Graph
// ============================================================================

struct Edge {
    from: i64,
    to: i64,
    relationship: String,
}

/// In-memory experiment graph
#[derive(Default)]
pub struct InMemoryGraph {
    nodes: Mutex<BTreeMap<i64, Experiment>>,
    edges: Mutex<Vec<Edge>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, id: i64, title: &str) {
        let now = chrono::Utc::now().fixed_offset();
        let node = Experiment {
            id,
            title: title.to_string(),
            description: None,
            motivation: None,
            expectations: None,
            status: "planned".to_string(),
            hypothesis: None,
            result: None,
            extra_data: None,
            created_at: now,
            updated_at: now,
        };
        self.nodes.lock().unwrap().insert(id, node);
    }

    pub fn update_node(&self, id: i64, update: impl FnOnce(&mut Experiment)) {
        if let Some(node) = self.nodes.lock().unwrap().get_mut(&id) {
            update(node);
        }
    }

    pub fn add_edge(&self, from: i64, to: i64, relationship: &str) {
        self.edges.lock().unwrap().push(Edge {
            from,
            to,
            relationship: relationship.to_string(),
        });
    }

    fn linked(&self, id: i64, parents: bool) -> Vec<LinkedNode> {
        let nodes = self.nodes.lock().unwrap();
        self.edges
            .lock()
            .unwrap()
            .iter()
            .filter_map(|edge| {
                let (near, far) = if parents { (edge.to, edge.from) } else { (edge.from, edge.to) };
                if near != id {
                    return None;
                }
                nodes.get(&far).map(|node| LinkedNode {
                    node: node.clone(),
                    relationship: edge.relationship.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn get_node(&self, id: i64) -> Result<Option<Experiment>> {
        Ok(self.nodes.lock().unwrap().get(&id).cloned())
    }

    async fn get_parents(&self, id: i64) -> Result<Vec<LinkedNode>> {
        Ok(self.linked(id, true))
    }

    async fn get_children(&self, id: i64) -> Result<Vec<LinkedNode>> {
        Ok(self.linked(id, false))
    }

    async fn adjacency(&self) -> Result<Adjacency> {
        let mut adjacency = Adjacency::new();
        for edge in self.edges.lock().unwrap().iter() {
            adjacency.entry(edge.from).or_default().push(edge.to);
        }
        Ok(adjacency)
    }
}

// ============================================================================
// Generative service
// ============================================================================

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail,
}

/// Scripted generator. JSON requests (proposals) and text requests
/// (summaries) consume separate scripts; the last reply of a script repeats.
/// An empty script fails.
#[derive(Default)]
pub struct ScriptedGenerator {
    proposals: Mutex<VecDeque<Reply>>,
    summaries: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw proposal response
    pub fn respond(self, raw: &str) -> Self {
        self.proposals.lock().unwrap().push_back(Reply::Text(raw.to_string()));
        self
    }

    /// Queue a failed proposal call
    pub fn fail(self) -> Self {
        self.proposals.lock().unwrap().push_back(Reply::Fail);
        self
    }

    /// Queue a summary response
    pub fn summarize_with(self, text: &str) -> Self {
        self.summaries.lock().unwrap().push_back(Reply::Text(text.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(script: &Mutex<VecDeque<Reply>>) -> Option<Reply> {
        let mut script = script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let script = if request.json_output { &self.proposals } else { &self.summaries };
        match Self::next(script) {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) | None => Err(AppError::Generation {
                message: "scripted failure".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Bibliographic index
// ============================================================================

/// In-memory bibliographic index
#[derive(Default)]
pub struct FakeIndex {
    by_doi: HashMap<String, WorkRecord>,
    by_id: HashMap<String, WorkRecord>,
    searches: HashMap<String, Vec<WorkRecord>>,
    delays: HashMap<String, Duration>,
    delay: Option<Duration>,
    failing: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Releases an in-flight slot, also when the call is cancelled
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doi(mut self, doi: &str, record: WorkRecord) -> Self {
        self.by_doi.insert(doi.to_lowercase(), record);
        self
    }

    pub fn with_id(mut self, id: &str, record: WorkRecord) -> Self {
        self.by_id.insert(id.to_uppercase(), record);
        self
    }

    /// Register hits for an exact (trimmed) query
    pub fn with_search(mut self, query: &str, hits: Vec<WorkRecord>) -> Self {
        self.searches.insert(query.trim().to_string(), hits);
        self
    }

    /// Delay every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay searches for one query
    pub fn delay_search(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.trim().to_string(), delay);
        self
    }

    /// Fail every call
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Number of calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self, extra_delay: Option<Duration>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        let _slot = InFlight(&self.in_flight);

        if let Some(delay) = self.delay.or(extra_delay) {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(AppError::Bibliographic {
                message: "index unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BibliographicIndex for FakeIndex {
    async fn lookup_by_identifier(&self, identifier: &WorkIdentifier) -> Result<Option<WorkRecord>> {
        self.enter(None).await?;
        Ok(match identifier {
            WorkIdentifier::Doi(doi) => self.by_doi.get(doi).cloned(),
            WorkIdentifier::IndexId(id) => self.by_id.get(id).cloned(),
        })
    }

    async fn search_by_text(&self, query: &str) -> Result<Vec<WorkRecord>> {
        let query = query.trim();
        self.enter(self.delays.get(query).copied()).await?;
        Ok(self.searches.get(query).cloned().unwrap_or_default())
    }
}
