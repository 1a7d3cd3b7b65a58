//! Execution engine implementation.
//!
//! A region request runs three passes over the nodes upstream of the
//! requested pad:
//!
//! 1. **Prepare** (depth-first, sources first): bounding boxes and pixel
//!    format negotiation for every node.
//! 2. **Request** (breadth-first, from the root): the rectangle each node
//!    must produce and each input pad must be supplied.
//! 3. **Evaluate** (depth-first, sources first): `process` on every node
//!    over its planned rectangle. Buffers are dropped once their last
//!    consumer has run.
//!
//! The request pass finishes before any evaluation starts, so the plan is
//! read-only while nodes run, optionally in parallel.

use crate::core::buffer::Buffer;
use crate::core::context::{InputInfo, ProcessContext, RegionContext};
use crate::core::error::{AmbitResult, ExecutionError, ExecutionResult, GraphError, NodeId};
use crate::core::format::PixelFormat;
use crate::core::node::Operation;
use crate::core::pad::PadDirection;
use crate::core::rect::Rectangle;
use crate::core::types::{PadType, Value};
use crate::execution::cache::{CacheKey, Dependencies};
use crate::execution::progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
use crate::graph::connection::Endpoint;
use crate::graph::structure::ProcessingGraph;
use crate::graph::topology::batches_in_order;
use crate::graph::visitor::{bfs_traverse, dfs_traverse, Visitor};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Execution options.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Whether to evaluate independent nodes in parallel.
    pub parallel: bool,
    /// Maximum number of parallel threads (0 = use all available).
    pub max_threads: usize,
    /// Whether to use the region cache of nodes that enable it.
    pub use_cache: bool,
    /// Progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("parallel", &self.parallel)
            .field("max_threads", &self.max_threads)
            .field("use_cache", &self.use_cache)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_threads: 0, // Use all available
            use_cache: true,
            progress_callback: None,
        }
    }
}

impl ExecutionOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable/disable parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set maximum threads.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    /// Enable/disable caching.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }
}

/// Statistics of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestStats {
    /// Identifier used in log lines of this request.
    pub request_id: Uuid,
    /// Total time spent, all passes included.
    pub total_duration: Duration,
    /// Nodes that ran `process` or `compute_scalar`.
    pub nodes_processed: usize,
    /// Nodes answered from the region cache.
    pub nodes_cached: usize,
    /// Nodes skipped because nothing was needed from them.
    pub nodes_skipped: usize,
    /// Bounding box of the requested node.
    pub root_bounding_box: Rectangle,
}

/// The result of a request together with its statistics.
#[derive(Debug)]
pub struct RequestOutput<T> {
    pub value: T,
    pub stats: RequestStats,
}

// ============================================================================
// Plans
// ============================================================================

/// What the prepare pass learned about one node.
#[derive(Debug, Clone)]
struct NodePrep {
    region: RegionContext,
    bounding_box: Rectangle,
    formats: HashMap<String, PixelFormat>,
    dependencies: Dependencies,
    /// Output pads read by this request, in declaration order.
    needed: Vec<String>,
}

/// The outcome of the request pass.
///
/// Rectangles are keyed by node for what a node produces and by input pad
/// for what that pad is supplied. Both are unions over every consumer.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    /// Identifier of the request this plan belongs to.
    pub request_id: Uuid,
    root: Endpoint,
    request: Rectangle,
    format: PixelFormat,
    order: Vec<NodeId>,
    node_rects: HashMap<NodeId, Rectangle>,
    input_rects: HashMap<Endpoint, Rectangle>,
    bounding_boxes: HashMap<NodeId, Rectangle>,
    cached: HashMap<Endpoint, Buffer>,
    scalars: HashSet<Endpoint>,
}

impl RequestPlan {
    /// The leaf output pad the request was made on.
    pub fn root(&self) -> &Endpoint {
        &self.root
    }

    /// The requested rectangle.
    pub fn request(&self) -> Rectangle {
        self.request
    }

    /// Format of the root pad.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Nodes upstream of the root, sources first.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Rectangle a node produces. Empty for nodes nothing is needed from.
    pub fn node_rect(&self, node_id: NodeId) -> Option<Rectangle> {
        self.node_rects.get(&node_id).copied()
    }

    /// Rectangle supplied to an input pad.
    pub fn input_rect(&self, node_id: NodeId, pad: &str) -> Option<Rectangle> {
        self.input_rects.get(&Endpoint::new(node_id, pad)).copied()
    }

    /// Bounding box computed for a node.
    pub fn bounding_box(&self, node_id: NodeId) -> Option<Rectangle> {
        self.bounding_boxes.get(&node_id).copied()
    }

    /// Whether a node is answered from the region cache.
    pub fn is_cached(&self, node_id: NodeId) -> bool {
        self.cached.keys().any(|e| e.node_id == node_id)
    }

    /// Whether a scalar output pad is read by this request.
    pub fn wants_scalar(&self, node_id: NodeId, pad: &str) -> bool {
        self.scalars.contains(&Endpoint::new(node_id, pad))
    }
}

/// Everything the evaluate pass reads.
struct Prepared {
    nodes: HashMap<NodeId, NodePrep>,
    plan: RequestPlan,
}

/// A value travelling along a connection.
#[derive(Debug, Clone)]
enum Delivered {
    Pixels(Buffer),
    Scalar(Value),
}

fn leaf_operation(graph: &ProcessingGraph, node_id: NodeId) -> ExecutionResult<&dyn Operation> {
    graph
        .get_node(node_id)
        .ok()
        .and_then(|n| n.operation())
        .ok_or_else(|| ExecutionError::InvalidRequest {
            node_id,
            pad: String::new(),
            reason: "not an operation node".to_string(),
        })
}

// ============================================================================
// Prepare pass
// ============================================================================

/// Bounding boxes and formats, sources first.
struct PreparePass {
    nodes: HashMap<NodeId, NodePrep>,
    order: Vec<NodeId>,
}

impl Visitor for PreparePass {
    fn visit_node(&mut self, graph: &ProcessingGraph, node_id: NodeId) -> ExecutionResult<()> {
        let node = graph
            .get_node(node_id)
            .map_err(|e| ExecutionError::Other(e.to_string()))?;
        let op = leaf_operation(graph, node_id)?;

        let mut region = RegionContext::new(node_id);
        let mut dependencies = Dependencies::of(node_id);

        for pad in node.input_pads() {
            let input = Endpoint::new(node_id, pad.name());
            let Some(conn) = graph.incoming(&input) else {
                continue;
            };
            let Some(source) = self.nodes.get(&conn.from.node_id) else {
                return Err(ExecutionError::CycleDetected { node_id });
            };
            dependencies.absorb(&source.dependencies, conn.id);

            let format = match pad.pad_type() {
                PadType::PixelStream(policy) => {
                    let offered = source
                        .formats
                        .get(&conn.from.pad)
                        .copied()
                        .unwrap_or_default();
                    let negotiated = policy.negotiate(offered).ok_or_else(|| {
                        ExecutionError::FormatNegotiationFailure {
                            node_id,
                            pad: pad.name().to_string(),
                            offered,
                            policy,
                        }
                    })?;
                    Some(negotiated)
                }
                PadType::Scalar(_) => None,
            };
            region.add_input(
                pad.name(),
                InputInfo {
                    bounding_box: source.bounding_box,
                    format,
                },
            );
        }

        let bounding_box = op.bounding_box(&region);
        let formats = node
            .output_pads()
            .filter(|p| p.pad_type().is_pixel())
            .map(|p| (p.name().to_string(), op.output_format(p.name(), &region)))
            .collect();

        log::trace!("prepare {}: bbox {}", node_id, bounding_box);
        self.nodes.insert(
            node_id,
            NodePrep {
                region,
                bounding_box,
                formats,
                dependencies,
                needed: Vec::new(),
            },
        );
        self.order.push(node_id);
        Ok(())
    }
}

// ============================================================================
// Request pass
// ============================================================================

/// Required rectangles, from the root towards the sources.
struct RequestPass<'a> {
    nodes: &'a HashMap<NodeId, NodePrep>,
    needs: HashMap<NodeId, Rectangle>,
    node_rects: HashMap<NodeId, Rectangle>,
    input_rects: HashMap<Endpoint, Rectangle>,
    cached: HashMap<Endpoint, Buffer>,
    scalars: HashSet<Endpoint>,
    use_cache: bool,
}

impl RequestPass<'_> {
    fn try_cache(&self, graph: &ProcessingGraph, node_id: NodeId, prep: &NodePrep, need: &Rectangle) -> Option<Vec<(Endpoint, Buffer)>> {
        let node = graph.get_node(node_id).ok()?;
        if !self.use_cache || !node.cache || need.is_empty() || prep.needed.is_empty() {
            return None;
        }
        let mut hits = Vec::new();
        for pad in &prep.needed {
            if !node.get_pad(pad)?.pad_type().is_pixel() {
                return None;
            }
            let buffer = graph.cache().lookup(node_id, pad, need)?;
            hits.push((Endpoint::new(node_id, pad.as_str()), buffer));
        }
        Some(hits)
    }
}

impl Visitor for RequestPass<'_> {
    fn visit_node(&mut self, graph: &ProcessingGraph, node_id: NodeId) -> ExecutionResult<()> {
        let nodes = self.nodes;
        let Some(prep) = nodes.get(&node_id) else {
            return Ok(());
        };
        let node = graph
            .get_node(node_id)
            .map_err(|e| ExecutionError::Other(e.to_string()))?;
        let op = leaf_operation(graph, node_id)?;
        let need = self.needs.get(&node_id).copied().unwrap_or_else(Rectangle::empty);

        if let Some(hits) = self.try_cache(graph, node_id, prep, &need) {
            log::trace!("request {}: {} from cache", node_id, need);
            self.node_rects.insert(node_id, need);
            self.cached.extend(hits);
            return Ok(());
        }

        let full = if need.is_empty() {
            need
        } else {
            op.cached_region(&need, &prep.region)
        };
        if full.is_infinite() {
            return Err(ExecutionError::operation(
                node_id,
                "cannot produce an unbounded region",
            ));
        }
        log::trace!("request {}: {}", node_id, full);
        self.node_rects.insert(node_id, full);
        if full.is_empty() {
            return Ok(());
        }

        for pad in node.input_pads() {
            let input = Endpoint::new(node_id, pad.name());
            let Some(conn) = graph.incoming(&input) else {
                continue;
            };
            let source_bbox = nodes
                .get(&conn.from.node_id)
                .map(|p| p.bounding_box)
                .unwrap_or_else(Rectangle::empty);

            let rect = if pad.pad_type().is_pixel() {
                op.required_input_region(pad.name(), &full, &prep.region)
            } else {
                // Scalars summarise the whole source
                self.scalars.insert(conn.from.clone());
                source_bbox
            };
            let clamped = rect.intersect(&source_bbox);

            let supplied = self.input_rects.entry(input).or_insert_with(Rectangle::empty);
            *supplied = supplied.union(&clamped);
            let source_need = self
                .needs
                .entry(conn.from.node_id)
                .or_insert_with(Rectangle::empty);
            *source_need = source_need.union(&clamped);
        }
        Ok(())
    }
}

// ============================================================================
// Evaluate pass
// ============================================================================

/// Shared, read-only state of an evaluation.
struct Evaluation<'a> {
    graph: &'a ProcessingGraph,
    prepared: &'a Prepared,
    tracker: &'a ProgressTracker,
    use_cache: bool,
}

impl Evaluation<'_> {
    /// Run one node against the buffers produced so far.
    fn evaluate_node(
        &self,
        node_id: NodeId,
        available: &HashMap<Endpoint, Delivered>,
    ) -> ExecutionResult<Vec<(Endpoint, Delivered)>> {
        let plan = &self.prepared.plan;
        let Some(prep) = self.prepared.nodes.get(&node_id) else {
            return Ok(Vec::new());
        };
        if prep.needed.is_empty() {
            return Ok(Vec::new());
        }

        if plan.is_cached(node_id) {
            self.tracker.node_cached(node_id);
            return Ok(plan
                .cached
                .iter()
                .filter(|(e, _)| e.node_id == node_id)
                .map(|(e, b)| (e.clone(), Delivered::Pixels(b.clone())))
                .collect());
        }

        let graph = self.graph;
        let node = graph
            .get_node(node_id)
            .map_err(|e| ExecutionError::Other(e.to_string()))?;
        let op = leaf_operation(graph, node_id)?;
        let rect = plan.node_rect(node_id).unwrap_or_else(Rectangle::empty);

        let mut buffers = Vec::new();
        let mut scalars = Vec::new();
        for pad in node.input_pads() {
            let input = Endpoint::new(node_id, pad.name());
            let Some(conn) = graph.incoming(&input) else {
                continue;
            };
            match available.get(&conn.from) {
                Some(Delivered::Pixels(buffer)) => buffers.push((pad.name(), buffer.clone())),
                Some(Delivered::Scalar(value)) => scalars.push((pad.name(), value.clone())),
                None => {}
            }
        }

        let started = Instant::now();
        let mut produced = Vec::new();
        for pad_name in &prep.needed {
            let Some(pad) = node.get_pad(pad_name) else {
                continue;
            };
            let is_pixel = pad.pad_type().is_pixel();
            if is_pixel && rect.is_empty() {
                continue;
            }
            if !is_pixel && !plan.wants_scalar(node_id, pad_name) {
                continue;
            }

            let format = prep.formats.get(pad_name).copied().unwrap_or_default();
            let mut ctx = ProcessContext::new(&prep.region, pad_name.as_str(), rect, format);
            for (name, buffer) in &buffers {
                ctx.add_input(*name, buffer.clone());
            }
            for (name, value) in &scalars {
                ctx.add_scalar(*name, value.clone());
            }

            let endpoint = Endpoint::new(node_id, pad_name.as_str());
            if is_pixel {
                let buffer = op.process(&ctx).map_err(|e| e.attribute_to(node_id))?;
                if !buffer.extent().contains(&rect) {
                    return Err(ExecutionError::operation(
                        node_id,
                        format!(
                            "output '{}' covers {} but {} was requested",
                            pad_name,
                            buffer.extent(),
                            rect
                        ),
                    ));
                }
                if self.use_cache && node.cache {
                    graph.cache().insert(
                        CacheKey::new(node_id, pad_name.as_str(), rect),
                        buffer.clone(),
                        prep.dependencies.clone(),
                    );
                }
                produced.push((endpoint, Delivered::Pixels(buffer)));
            } else {
                let value = op
                    .compute_scalar(pad_name, &ctx)
                    .map_err(|e| e.attribute_to(node_id))?;
                produced.push((endpoint, Delivered::Scalar(value)));
            }
        }

        if !produced.is_empty() {
            self.tracker.node_processed(
                node_id,
                node.display_name(),
                rect,
                started.elapsed().as_millis() as u64,
            );
        }
        Ok(produced)
    }
}

/// Produced values and how many consumers still need each.
struct EvaluatePass<'a> {
    evaluation: Evaluation<'a>,
    available: HashMap<Endpoint, Delivered>,
    remaining: HashMap<Endpoint, usize>,
    processed: usize,
    skipped: usize,
}

impl<'a> EvaluatePass<'a> {
    fn new(evaluation: Evaluation<'a>) -> Self {
        let graph = evaluation.graph;
        let plan = &evaluation.prepared.plan;
        let mut remaining: HashMap<Endpoint, usize> = HashMap::new();
        for &node_id in plan.order() {
            for conn in graph.connections_to(node_id) {
                *remaining.entry(conn.from.clone()).or_default() += 1;
            }
        }
        *remaining.entry(plan.root().clone()).or_default() += 1;

        Self {
            evaluation,
            available: HashMap::new(),
            remaining,
            processed: 0,
            skipped: 0,
        }
    }

    /// Store what a node produced and release inputs it was the last reader of.
    fn merge(&mut self, node_id: NodeId, produced: Vec<(Endpoint, Delivered)>) {
        if produced.is_empty() {
            self.skipped += 1;
        } else if !self.evaluation.prepared.plan.is_cached(node_id) {
            self.processed += 1;
        }
        self.available.extend(produced);

        for conn in self.evaluation.graph.connections_to(node_id) {
            if let Some(count) = self.remaining.get_mut(&conn.from) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.available.remove(&conn.from);
                }
            }
        }
    }

    fn run_parallel(&mut self, pool: Option<&rayon::ThreadPool>) -> ExecutionResult<()> {
        let order = self.evaluation.prepared.plan.order().to_vec();
        for batch in batches_in_order(self.evaluation.graph, &order) {
            let evaluation = &self.evaluation;
            let available = &self.available;
            let evaluate = || -> Vec<ExecutionResult<Vec<(Endpoint, Delivered)>>> {
                batch
                    .par_iter()
                    .map(|&node_id| evaluation.evaluate_node(node_id, available))
                    .collect()
            };
            let results = match pool {
                Some(pool) => pool.install(evaluate),
                None => evaluate(),
            };
            for (&node_id, result) in batch.iter().zip(results) {
                let produced = result?;
                self.merge(node_id, produced);
            }
        }
        Ok(())
    }

    fn take(&mut self, endpoint: &Endpoint) -> Option<Delivered> {
        self.available.remove(endpoint)
    }
}

impl Visitor for EvaluatePass<'_> {
    fn visit_node(&mut self, _graph: &ProcessingGraph, node_id: NodeId) -> ExecutionResult<()> {
        let produced = self.evaluation.evaluate_node(node_id, &self.available)?;
        self.merge(node_id, produced);
        Ok(())
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The execution engine.
pub struct ExecutionEngine {
    /// Default execution options.
    default_options: ExecutionOptions,
    /// Worker pool when a thread limit is configured.
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl ExecutionEngine {
    /// Create a new execution engine.
    pub fn new() -> Self {
        Self {
            default_options: ExecutionOptions::default(),
            pool: None,
        }
    }

    /// Create an engine configured from a config file's settings.
    pub fn from_config(config: &crate::execution::config::EngineConfig) -> Self {
        Self::new().with_default_options(config.execution_options())
    }

    /// Set default options.
    pub fn with_default_options(mut self, options: ExecutionOptions) -> Self {
        self.pool = if options.parallel && options.max_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(options.max_threads)
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    log::warn!("Falling back to the global thread pool: {}", e);
                    None
                }
            }
        } else {
            None
        };
        self.default_options = options;
        self
    }

    /// The options used when a call does not pass its own.
    pub fn default_options(&self) -> &ExecutionOptions {
        &self.default_options
    }

    /// Compute `rect` of the output pad `pad` on `node`.
    ///
    /// The returned buffer's extent is exactly `rect` and its storage belongs
    /// to the caller. Pixels outside the node's bounding box read as
    /// transparent.
    pub fn request_region(
        &self,
        graph: &ProcessingGraph,
        node: NodeId,
        pad: &str,
        rect: &Rectangle,
    ) -> AmbitResult<Buffer> {
        Ok(self
            .request_region_with(graph, node, pad, rect, &self.default_options)?
            .value)
    }

    /// [`request_region`](Self::request_region) with explicit options,
    /// returning statistics as well.
    pub fn request_region_with(
        &self,
        graph: &ProcessingGraph,
        node: NodeId,
        pad: &str,
        rect: &Rectangle,
        options: &ExecutionOptions,
    ) -> AmbitResult<RequestOutput<Buffer>> {
        let root = self.resolve_root(graph, node, pad, true)?;
        if rect.is_infinite() {
            return Err(ExecutionError::InvalidRequest {
                node_id: node,
                pad: pad.to_string(),
                reason: "the requested rectangle is unbounded".to_string(),
            }
            .into());
        }

        let request_id = Uuid::new_v4();
        log::debug!("[{}] request {} on {}", request_id, rect, root);
        let (delivered, format, stats) = self.run(graph, root, Some(*rect), request_id, options)?;
        if rect.is_empty() {
            return Ok(RequestOutput {
                value: Buffer::empty(format),
                stats,
            });
        }

        // The caller gets private storage clipped to the root's bounding box
        let buffer = Buffer::new(*rect, format)?;
        if let Some(Delivered::Pixels(produced)) = delivered {
            let visible = rect
                .intersect(&stats.root_bounding_box)
                .intersect(&produced.valid_area());
            if !visible.is_empty() {
                buffer.set(&visible, format, &produced.get(&visible, format))?;
            }
        }
        Ok(RequestOutput { value: buffer, stats })
    }

    /// Compute a scalar output pad.
    pub fn request_scalar(&self, graph: &ProcessingGraph, node: NodeId, pad: &str) -> AmbitResult<Value> {
        let root = self.resolve_root(graph, node, pad, false)?;
        let request_id = Uuid::new_v4();
        log::debug!("[{}] scalar request on {}", request_id, root);
        let (delivered, _, _) = self.run(graph, root.clone(), None, request_id, &self.default_options)?;
        match delivered {
            Some(Delivered::Scalar(value)) => Ok(value),
            _ => Err(ExecutionError::operation(root.node_id, format!("no value for '{}'", root.pad)).into()),
        }
    }

    /// Run the prepare and request passes only.
    pub fn plan_request(
        &self,
        graph: &ProcessingGraph,
        node: NodeId,
        pad: &str,
        rect: &Rectangle,
    ) -> AmbitResult<RequestPlan> {
        let root = self.resolve_root(graph, node, pad, true)?;
        let prepared = self.plan(graph, root, Some(*rect), Uuid::new_v4(), self.default_options.use_cache)?;
        Ok(prepared.plan)
    }

    /// Bounding box of the node behind `pad`.
    pub fn bounding_box(&self, graph: &ProcessingGraph, node: NodeId, pad: &str) -> AmbitResult<Rectangle> {
        let root = graph.resolve(&Endpoint::new(node, pad))?;
        let nodes = self.prepare(graph, root.node_id)?.0;
        Ok(nodes
            .get(&root.node_id)
            .map(|p| p.bounding_box)
            .unwrap_or_else(Rectangle::empty))
    }

    fn resolve_root(&self, graph: &ProcessingGraph, node: NodeId, pad: &str, pixels: bool) -> AmbitResult<Endpoint> {
        let root = graph.resolve(&Endpoint::new(node, pad))?;
        let leaf = graph.pad(&root)?;
        if leaf.direction() != PadDirection::Output {
            return Err(GraphError::DirectionMismatch {
                node_id: node,
                pad: pad.to_string(),
                expected: PadDirection::Output,
            }
            .into());
        }
        if leaf.pad_type().is_pixel() != pixels {
            return Err(ExecutionError::InvalidRequest {
                node_id: node,
                pad: pad.to_string(),
                reason: format!("pad carries {}", leaf.pad_type()),
            }
            .into());
        }
        Ok(root)
    }

    fn prepare(&self, graph: &ProcessingGraph, root: NodeId) -> ExecutionResult<(HashMap<NodeId, NodePrep>, Vec<NodeId>)> {
        let mut pass = PreparePass {
            nodes: HashMap::new(),
            order: Vec::new(),
        };
        dfs_traverse(graph, &root, &mut pass)?;
        Ok((pass.nodes, pass.order))
    }

    /// Prepare and request passes. A `None` request asks for the whole
    /// bounding box of the root.
    fn plan(
        &self,
        graph: &ProcessingGraph,
        root: Endpoint,
        request: Option<Rectangle>,
        request_id: Uuid,
        use_cache: bool,
    ) -> ExecutionResult<Prepared> {
        let (mut nodes, order) = self.prepare(graph, root.node_id)?;

        // Output pads with a consumer inside this request
        let members: HashSet<NodeId> = order.iter().copied().collect();
        for &node_id in &order {
            let Ok(node) = graph.get_node(node_id) else {
                continue;
            };
            let needed: Vec<String> = node
                .output_pads()
                .filter(|p| {
                    let endpoint = Endpoint::new(node_id, p.name());
                    endpoint == root
                        || graph
                            .outgoing(&endpoint)
                            .iter()
                            .any(|c| members.contains(&c.to.node_id))
                })
                .map(|p| p.name().to_string())
                .collect();
            if let Some(prep) = nodes.get_mut(&node_id) {
                prep.needed = needed;
            }
        }

        let root_bbox = nodes
            .get(&root.node_id)
            .map(|p| p.bounding_box)
            .unwrap_or_else(Rectangle::empty);
        let request = request.unwrap_or(root_bbox);
        let format = nodes
            .get(&root.node_id)
            .and_then(|p| p.formats.get(&root.pad).copied())
            .unwrap_or_default();

        let mut pass = RequestPass {
            nodes: &nodes,
            needs: HashMap::from([(root.node_id, request.intersect(&root_bbox))]),
            node_rects: HashMap::new(),
            input_rects: HashMap::new(),
            cached: HashMap::new(),
            scalars: HashSet::from([root.clone()]),
            use_cache,
        };
        bfs_traverse(graph, &root.node_id, &mut pass)?;
        log::debug!(
            "[{}] planned {} nodes, {} from cache",
            request_id,
            order.len(),
            pass.cached.len()
        );

        let plan = RequestPlan {
            request_id,
            root,
            request,
            format,
            order,
            node_rects: pass.node_rects,
            input_rects: pass.input_rects,
            bounding_boxes: nodes.iter().map(|(id, p)| (*id, p.bounding_box)).collect(),
            cached: pass.cached,
            scalars: pass.scalars,
        };
        Ok(Prepared { nodes, plan })
    }

    fn run(
        &self,
        graph: &ProcessingGraph,
        root: Endpoint,
        request: Option<Rectangle>,
        request_id: Uuid,
        options: &ExecutionOptions,
    ) -> ExecutionResult<(Option<Delivered>, PixelFormat, RequestStats)> {
        let start_time = Instant::now();
        let result = self
            .plan(graph, root, request, request_id, options.use_cache)
            .and_then(|prepared| self.evaluate(graph, &prepared, options, start_time));

        match result {
            Ok((delivered, format, stats)) => {
                log::debug!(
                    "[{}] done in {:?}: {} processed, {} cached",
                    request_id,
                    stats.total_duration,
                    stats.nodes_processed,
                    stats.nodes_cached
                );
                Ok((delivered, format, stats))
            }
            Err(error) => {
                // Buffers produced so far were owned by the failed pass and are gone
                log::warn!("[{}] request failed: {}", request_id, error);
                ProgressTracker::new(0)
                    .with_callback(options.progress_callback.clone())
                    .report_error(error.node_id(), error.to_string());
                Err(error)
            }
        }
    }

    fn evaluate(
        &self,
        graph: &ProcessingGraph,
        prepared: &Prepared,
        options: &ExecutionOptions,
        start_time: Instant,
    ) -> ExecutionResult<(Option<Delivered>, PixelFormat, RequestStats)> {
        let plan = &prepared.plan;
        let mut tracker = ProgressTracker::new(plan.order().len())
            .with_callback(options.progress_callback.clone());
        tracker.start();

        let mut pass = EvaluatePass::new(Evaluation {
            graph,
            prepared,
            tracker: &tracker,
            use_cache: options.use_cache,
        });
        if options.parallel {
            pass.run_parallel(self.pool.as_deref())?;
        } else {
            dfs_traverse(graph, &plan.root().node_id, &mut pass)?;
        }

        let stats = RequestStats {
            request_id: plan.request_id,
            total_duration: start_time.elapsed(),
            nodes_processed: pass.processed,
            nodes_cached: tracker.nodes_cached(),
            nodes_skipped: pass.skipped,
            root_bounding_box: plan
                .bounding_box(plan.root().node_id)
                .unwrap_or_else(Rectangle::empty),
        };
        let delivered = pass.take(plan.root());
        tracker.complete();
        Ok((delivered, plan.format(), stats))
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
