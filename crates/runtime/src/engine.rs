// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The core inference engine with type-state–enforced pipeline.
//!
//! ```text
//! InferenceEngine<Idle>
//!     │  .prepare(graph) / .load_model()
//!     ▼
//! InferenceEngine<Prepared>      negotiated graph + one kernel per node
//!     │  .plan()
//!     ▼
//! InferenceEngine<Ready>         configured kernels + arena
//!     │  .run(inputs)   .reshape(shapes)
//!     ▼
//!   InferenceOutput
//! ```
//!
//! Each state transition consumes the old value and returns a new one,
//! making invalid state sequences a compile error. The data a state needs
//! lives inside the state itself, so no accessor has to assume a field is
//! populated.

use backend_planner::{negotiate, Backend, NegotiatedGraph};
use kernels::{Kernel, KernelIo};
use memory_manager::{Arena, ArenaBinding, ArenaPlanner};
use model_ir::{Graph, ModelLoader, NodeId, ShapeInference, TensorId, Validated};
use std::time::Instant;
use tensor_core::{Shape, ShapeStatus, Tensor};
use tracing::{debug, info, warn};

use crate::{InferenceMetrics, MemoryPlan, RuntimeConfig, RuntimeError};

// ── Type-state markers ─────────────────────────────────────────

/// Engine is created but holds no graph.
#[derive(Debug)]
pub struct Idle;

/// The graph is negotiated across backends and every node has a kernel.
#[derive(Debug)]
pub struct Prepared {
    negotiated: NegotiatedGraph,
    /// Indexed by node id.
    kernels: Vec<Kernel>,
    /// Graph input shapes as the model declared them, in input order.
    declared: Vec<Shape>,
}

/// Kernels are configured and the arena is allocated.
#[derive(Debug)]
pub struct Ready {
    negotiated: NegotiatedGraph,
    kernels: Vec<Kernel>,
    declared: Vec<Shape>,
    memory: MemoryPlan,
    arena: Arena,
    epoch: u64,
}

/// Marker trait for engine states.
pub trait EngineState: std::fmt::Debug {}
impl EngineState for Idle {}
impl EngineState for Prepared {}
impl EngineState for Ready {}

// ── Inference output ───────────────────────────────────────────

/// The result of a single inference run.
#[derive(Debug)]
pub struct InferenceOutput {
    /// Graph outputs, in declaration order.
    pub outputs: Vec<Tensor>,
    /// Names of the graph outputs, parallel to `outputs`.
    pub names: Vec<String>,
    /// Per-node and overall timing metrics.
    pub metrics: InferenceMetrics,
}

impl InferenceOutput {
    /// Looks up an output by tensor name.
    pub fn output(&self, name: &str) -> Option<&Tensor> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.outputs.get(i))
    }
}

// ── Engine ─────────────────────────────────────────────────────

/// The primary inference engine.
///
/// `S` is a type-state marker that enforces the pipeline ordering at
/// compile time. You cannot call `.run()` on an `Idle` engine or
/// `.prepare()` on a `Ready` engine; the compiler catches it.
///
/// A `Ready` engine owns its arena exclusively. `run` takes `&mut self`,
/// so a single engine never executes two passes at once; hosts that want
/// parallelism build one engine per thread.
///
/// # Example
/// ```no_run
/// use runtime::{InferenceEngine, RuntimeConfig};
/// use tensor_core::Tensor;
///
/// # fn example() -> Result<(), runtime::RuntimeError> {
/// let mut engine = InferenceEngine::new(RuntimeConfig::default())
///     .load_model()?
///     .plan()?;
/// let image = Tensor::from_f32(vec![1, 28, 28, 3], &vec![0.5; 28 * 28 * 3])?;
/// let output = engine.run(&[image])?;
/// println!("{}", output.metrics.summary());
/// # Ok(())
/// # }
/// ```
pub struct InferenceEngine<S: EngineState = Idle> {
    config: RuntimeConfig,
    backends: Vec<Box<dyn Backend>>,
    state: S,
}

impl<S: EngineState> InferenceEngine<S> {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Ids of the backends in preference order.
    pub fn backend_ids(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.id()).collect()
    }
}

// ── Idle → Prepared ────────────────────────────────────────────

impl InferenceEngine<Idle> {
    /// Creates a new engine from the given configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        info!(backends = ?config.backends, "engine created");
        Self {
            config,
            backends: Vec::new(),
            state: Idle,
        }
    }

    /// Uses `backends` instead of the ones named in the configuration.
    pub fn with_backends(mut self, backends: Vec<Box<dyn Backend>>) -> Self {
        self.backends = backends;
        self
    }

    /// Loads the model named by the configuration and prepares it.
    pub fn load_model(self) -> Result<InferenceEngine<Prepared>, RuntimeError> {
        let graph = ModelLoader::load(&self.config.model_path)?;
        info!("{}", graph.summary());
        self.prepare(graph)
    }

    /// Negotiates `graph` across the backends, resolves what shapes it can,
    /// and builds one kernel per node.
    ///
    /// Steps:
    /// 1. Construct the configured backends unless some were injected.
    /// 2. Negotiate backend and layout per node, inserting conversions.
    /// 3. Apply configured input shapes.
    /// 4. Run shape inference in each node's negotiated layout.
    /// 5. Ask each node's backend for its kernel.
    pub fn prepare(self, graph: Graph<Validated>) -> Result<InferenceEngine<Prepared>, RuntimeError> {
        let backends = if self.backends.is_empty() {
            self.config.create_backends()?
        } else {
            self.backends
        };

        let mut negotiated = negotiate(graph, &backends)?;
        let declared = declared_inputs(&negotiated.graph);
        for (name, dims) in &self.config.input_shapes {
            apply_input_shape(&mut negotiated.graph, &declared, name, dims, ResizeRule::FillUnknown)?;
        }
        infer_shapes(&mut negotiated)?;

        let mut kernels = Vec::with_capacity(negotiated.graph.num_nodes());
        for (index, node) in negotiated.graph.nodes().iter().enumerate() {
            let id = NodeId(index);
            let prepare_error = |source| RuntimeError::Prepare {
                node: index,
                name: node.name.clone(),
                source,
            };
            let assignment = negotiated.assignment(id).ok_or_else(|| {
                prepare_error(kernels::KernelError::MalformedNode {
                    kind: node.kind,
                    detail: "node has no backend assignment".into(),
                })
            })?;
            let backend = &backends[assignment.backend];
            let kernel = backend
                .build_kernel(id, node, assignment.layout)
                .map_err(prepare_error)?;
            debug!(node = %id, backend = backend.id(), "built {kernel}");
            kernels.push(kernel);
        }

        info!(
            nodes = kernels.len(),
            conversions = negotiated.conversions,
            "graph prepared"
        );
        Ok(InferenceEngine {
            config: self.config,
            backends,
            state: Prepared {
                negotiated,
                kernels,
                declared,
            },
        })
    }
}

// ── Prepared → Ready ───────────────────────────────────────────

impl InferenceEngine<Prepared> {
    pub fn graph(&self) -> &Graph<Validated> {
        &self.state.negotiated.graph
    }

    pub fn negotiated(&self) -> &NegotiatedGraph {
        &self.state.negotiated
    }

    pub fn kernels(&self) -> &[Kernel] {
        &self.state.kernels
    }

    /// Gives the graph input `name` concrete dimensions before planning.
    ///
    /// `dims` must have the declared rank and agree with every declared
    /// dimension that is already known.
    pub fn resize_input(&mut self, name: &str, dims: &[usize]) -> Result<(), RuntimeError> {
        apply_input_shape(
            &mut self.state.negotiated.graph,
            &self.state.declared,
            name,
            dims,
            ResizeRule::FillUnknown,
        )?;
        self.state.negotiated.graph.reset_derived_shapes();
        infer_shapes(&mut self.state.negotiated)
    }

    /// Configures every kernel in execution order, plans the arena and
    /// checks it against the memory budget.
    pub fn plan(self) -> Result<InferenceEngine<Ready>, RuntimeError> {
        let budget = self.config.parse_budget()?;
        let Prepared {
            mut negotiated,
            mut kernels,
            declared,
        } = self.state;

        let memory = configure_and_plan(&mut negotiated.graph, &mut kernels)?;
        budget.check(memory.arena_bytes())?;
        let arena = Arena::new(memory.arena_bytes());
        info!(
            budget = %budget,
            "arena planned: {}",
            memory.stats().summary()
        );

        Ok(InferenceEngine {
            config: self.config,
            backends: self.backends,
            state: Ready {
                negotiated,
                kernels,
                declared,
                memory,
                arena,
                epoch: 0,
            },
        })
    }
}

// ── Ready: run inference ───────────────────────────────────────

impl InferenceEngine<Ready> {
    pub fn graph(&self) -> &Graph<Validated> {
        &self.state.negotiated.graph
    }

    pub fn negotiated(&self) -> &NegotiatedGraph {
        &self.state.negotiated
    }

    pub fn kernels(&self) -> &[Kernel] {
        &self.state.kernels
    }

    pub fn memory_plan(&self) -> &MemoryPlan {
        &self.state.memory
    }

    /// Number of completed reshapes since planning.
    pub fn epoch(&self) -> u64 {
        self.state.epoch
    }

    /// Runs one inference pass.
    ///
    /// `inputs` binds the graph inputs in declaration order; each tensor
    /// must match the input's dtype and current shape exactly.
    pub fn run(&mut self, inputs: &[Tensor]) -> Result<InferenceOutput, RuntimeError> {
        let run_start = Instant::now();
        let profiling = self.config.enable_profiling;
        let Ready {
            negotiated,
            kernels,
            memory,
            arena,
            ..
        } = &mut self.state;
        let graph = &negotiated.graph;

        if inputs.len() != graph.inputs().len() {
            return Err(RuntimeError::InputCount {
                expected: graph.inputs().len(),
                actual: inputs.len(),
            });
        }
        for (index, (&t, host)) in graph.inputs().iter().zip(inputs).enumerate() {
            let slot = check_input(graph, memory, index, t, host)?;
            arena.slot_mut(slot)?.copy_from_slice(host.as_bytes());
        }

        let mut metrics = InferenceMetrics::new(graph.num_nodes(), memory.arena_bytes());
        for (step, &id) in graph.order().iter().enumerate() {
            let kernel = &kernels[id.0];
            let execution_error = |source| RuntimeError::ExecutionError {
                node: id.0,
                name: kernel.name().to_string(),
                source,
            };

            let mut reads = Vec::with_capacity(kernel.inputs().len());
            for &t in kernel.inputs() {
                if constant_bytes(graph, t).is_none() {
                    reads.push(arena_slot(graph, memory, t)?);
                }
            }
            let mut writes = vec![arena_slot(graph, memory, kernel.outputs()[0])?];
            writes.extend(memory.scratch_slot(step));

            let ArenaBinding { reads, writes } = arena.bind(&reads, &writes)?;
            let mut bound = reads.into_iter();
            let io_inputs: Vec<&[u8]> = kernel
                .inputs()
                .iter()
                .map(|&t| constant_bytes(graph, t).unwrap_or_else(|| bound.next().unwrap_or_default()))
                .collect();
            let mut writes = writes.into_iter();
            let mut io = KernelIo::new(&io_inputs, writes.next().unwrap_or_default());
            if let Some(scratch) = writes.next() {
                io = io.with_scratch(scratch);
            }

            let start = Instant::now();
            kernel.execute(&mut io).map_err(execution_error)?;
            if profiling {
                metrics.record_node(
                    kernel.name().to_string(),
                    kernel.kind().as_str().to_string(),
                    negotiated.backend_id(id).unwrap_or("?").to_string(),
                    start.elapsed(),
                );
            }
        }

        let mut outputs = Vec::with_capacity(graph.outputs().len());
        let mut names = Vec::with_capacity(graph.outputs().len());
        for &t in graph.outputs() {
            let def = graph.tensor(t).ok_or_else(|| RuntimeError::UnresolvedShape {
                tensor: t.to_string(),
            })?;
            let dims = def
                .info
                .concrete_dims()
                .ok_or_else(|| RuntimeError::UnresolvedShape {
                    tensor: def.name.clone(),
                })?;
            let bytes = match constant_bytes(graph, t) {
                Some(bytes) => bytes.to_vec(),
                None => arena.slot(arena_slot(graph, memory, t)?)?.to_vec(),
            };
            let mut tensor = Tensor::from_bytes(dims, def.info.dtype, bytes)?;
            if let Some(q) = &def.info.quantization {
                tensor = tensor.with_quantization(q.clone());
            }
            outputs.push(tensor);
            names.push(def.name.clone());
        }

        metrics.finalise(run_start.elapsed());
        debug!("{}", metrics.summary());
        Ok(InferenceOutput {
            outputs,
            names,
            metrics,
        })
    }

    /// Starts a new shape epoch with new graph input shapes.
    ///
    /// Each new shape only needs the rank the model declared for that
    /// input; known dimensions may change. Every produced shape is
    /// re-derived, every kernel reconfigured and the arena re-planned. On
    /// failure the engine keeps its previous shapes and plan and remains
    /// usable.
    pub fn reshape(&mut self, shapes: &[(&str, Vec<usize>)]) -> Result<(), RuntimeError> {
        let budget = self.config.parse_budget()?;
        let mut graph = self.state.negotiated.graph.clone();
        let mut kernels = self.state.kernels.clone();

        for (name, dims) in shapes {
            apply_input_shape(&mut graph, &self.state.declared, name, dims, ResizeRule::SameRank)?;
        }
        graph.reset_derived_shapes();
        let memory = configure_and_plan(&mut graph, &mut kernels)?;
        budget.check(memory.arena_bytes())?;

        let state = &mut self.state;
        if state.arena.len() != memory.arena_bytes() {
            state.arena = Arena::new(memory.arena_bytes());
        }
        state.negotiated.graph = graph;
        state.kernels = kernels;
        state.memory = memory;
        state.epoch += 1;
        info!(
            epoch = state.epoch,
            arena_bytes = state.memory.arena_bytes(),
            "graph reshaped"
        );
        Ok(())
    }
}

impl<S: EngineState> std::fmt::Debug for InferenceEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("state", &std::any::type_name::<S>())
            .field("backends", &self.backend_ids())
            .field("model_path", &self.config.model_path)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────

/// Shape inference over the whole graph, each node in its negotiated layout.
fn infer_shapes(negotiated: &mut NegotiatedGraph) -> Result<(), RuntimeError> {
    let frontend = negotiated.graph.layout;
    let assignments = &negotiated.assignments;
    let report = ShapeInference::run(&mut negotiated.graph, |id| {
        assignments.get(id.0).map_or(frontend, |a| a.layout)
    })?;
    if !report.deferred.is_empty() {
        warn!(
            deferred = report.deferred.len(),
            "some shapes stay unresolved until the inputs are resized"
        );
    }
    Ok(())
}

/// How new input dimensions are checked against the declared shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResizeRule {
    /// Only unknown dimensions may take a value.
    FillUnknown,
    /// Any dimensions of the declared rank.
    SameRank,
}

fn declared_inputs(graph: &Graph<Validated>) -> Vec<Shape> {
    graph
        .inputs()
        .iter()
        .map(|&t| graph.info(t).map(|i| i.shape.clone()).unwrap_or_default())
        .collect()
}

/// Sets the current shape of graph input `name`.
fn apply_input_shape(
    graph: &mut Graph<Validated>,
    declared: &[Shape],
    name: &str,
    dims: &[usize],
    rule: ResizeRule,
) -> Result<(), RuntimeError> {
    let inputs = graph.inputs();
    let index = inputs
        .iter()
        .position(|&t| graph.tensor(t).is_some_and(|d| d.name == name))
        .ok_or_else(|| RuntimeError::UnknownInput(name.to_string()))?;
    let id = inputs[index];
    let Some(def) = graph.tensor(id) else {
        return Err(RuntimeError::UnknownInput(name.to_string()));
    };
    let Some(declared) = declared.get(index) else {
        return Err(RuntimeError::UnknownInput(name.to_string()));
    };
    let fits = match rule {
        ResizeRule::FillUnknown => declared.accepts(dims),
        ResizeRule::SameRank => declared.rank() == dims.len(),
    };
    if !fits {
        return Err(RuntimeError::InputMismatch {
            index,
            name: name.to_string(),
            detail: format!("shape {:?} does not fit declared {}", dims, declared),
        });
    }

    let mut info = def.info.clone();
    info.shape = Shape::new(dims.to_vec());
    info.status = ShapeStatus::Valid;
    graph.set_info(id, info);
    Ok(())
}

/// Configures every kernel in execution order and plans the arena.
fn configure_and_plan(
    graph: &mut Graph<Validated>,
    kernels: &mut [Kernel],
) -> Result<MemoryPlan, RuntimeError> {
    for id in graph.order().to_vec() {
        let kernel = &mut kernels[id.0];
        kernel
            .configure(graph)
            .map_err(|source| RuntimeError::Prepare {
                node: id.0,
                name: kernel.name().to_string(),
                source,
            })?;
    }
    MemoryPlan::build(graph, kernels, &ArenaPlanner::default())
}

fn constant_bytes(graph: &Graph<Validated>, id: TensorId) -> Option<&[u8]> {
    graph
        .tensor(id)
        .and_then(|t| t.data.as_ref())
        .map(|d| d.as_bytes())
}

fn arena_slot(
    graph: &Graph<Validated>,
    memory: &MemoryPlan,
    id: TensorId,
) -> Result<memory_manager::Slot, RuntimeError> {
    memory.tensor_slot(id).ok_or_else(|| RuntimeError::UnresolvedShape {
        tensor: graph
            .tensor(id)
            .map_or_else(|| id.to_string(), |t| t.name.clone()),
    })
}

/// Checks one host tensor against graph input `index` and returns its slot.
fn check_input(
    graph: &Graph<Validated>,
    memory: &MemoryPlan,
    index: usize,
    id: TensorId,
    host: &Tensor,
) -> Result<memory_manager::Slot, RuntimeError> {
    let Some(def) = graph.tensor(id) else {
        return Err(RuntimeError::UnknownInput(id.to_string()));
    };
    let mismatch = |detail: String| RuntimeError::InputMismatch {
        index,
        name: def.name.clone(),
        detail,
    };
    if host.dtype() != def.info.dtype {
        return Err(mismatch(format!(
            "dtype {} does not match {}",
            host.dtype(),
            def.info.dtype
        )));
    }
    if def.info.concrete_dims().as_deref() != Some(host.dims()) {
        return Err(mismatch(format!(
            "shape {:?} does not match {}",
            host.dims(),
            def.info.shape
        )));
    }
    arena_slot(graph, memory, id)
}
