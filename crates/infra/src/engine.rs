//! Control/render split over bounded crossbeam queues
//!
//! Commands address nodes by position. The controller keeps a mirror of the
//! chain in the same order the renderer will have once every queued command
//! is applied, so positions resolved on the control side stay valid on the
//! render side. Anything the renderer would otherwise free (removed nodes,
//! spent reorder tables) is shipped back to be dropped off the audio thread.
//! Derived buffers replaced by a parameter edit stay on the control side
//! until the renderer has finished the pass that might still read them.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use crossbeam::utils::CachePadded;
use fxgraph_core::domain::dsp::{BufferPublisher, RetiredBuffer};
use fxgraph_core::domain::generator::{entropy_noise, NoiseSource};
use fxgraph_core::domain::graph::permutation;
use fxgraph_core::domain::{
    AudioError, AudioFormat, ChainConfig, Effect, EffectKind, EffectNode, EffectSpec, FilterMode,
    NodeId, ParameterStore, SignalGraph,
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors reported by the control side
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Command queue is full; the edit was not applied
    #[error("Command queue is full")]
    QueueFull,

    /// Render side was dropped
    #[error("Render side disconnected")]
    Disconnected,
}

/// Edit applied by the renderer at the next buffer boundary
enum Command {
    Insert {
        position: usize,
        id: NodeId,
        node: EffectNode,
    },
    Remove(usize),
    Permute(Vec<usize>),
    Enable(usize),
    Disable(usize),
    SetMode(usize, FilterMode),
    /// Store a value whose derived buffer is already published
    SyncParameter {
        index: usize,
        name: &'static str,
        value: f32,
    },
    Reset,
}

/// Supplies the noise for reverb tails regenerated on the control side
type NoiseProvider = Box<dyn FnMut() -> NoiseSource + Send>;

/// Values the renderer hands back to be dropped on the control thread
enum Garbage {
    Node(NodeId, EffectNode),
    Order(Vec<usize>),
}

/// Output level readings written by the renderer
#[derive(Default)]
struct RenderMeter {
    buffers: CachePadded<AtomicU64>,
    peak_bits: CachePadded<AtomicU32>,
}

impl RenderMeter {
    fn record(&self, buffer: &[f32]) {
        let peak = buffer.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        self.peak_bits.store(peak.to_bits(), Ordering::Relaxed);
        self.buffers.fetch_add(1, Ordering::Release);
    }

    fn peak(&self) -> f32 {
        f32::from_bits(self.peak_bits.load(Ordering::Relaxed))
    }

    fn buffers(&self) -> u64 {
        self.buffers.load(Ordering::Acquire)
    }
}

/// Control-side copy of one node
struct NodeMirror {
    id: NodeId,
    kind: EffectKind,
    enabled: bool,
    mode: Option<FilterMode>,
    params: ParameterStore,
    publisher: Option<BufferPublisher>,
}

impl NodeMirror {
    fn new(id: NodeId, node: &EffectNode, noise: &mut NoiseProvider) -> Self {
        Self {
            id,
            kind: node.kind(),
            enabled: node.is_enabled(),
            mode: node.mode(),
            params: node.params().clone(),
            publisher: node.publisher(noise()),
        }
    }
}

/// Split a graph into its control and render halves
///
/// `capacity` bounds the number of commands in flight and the number of
/// nodes that can be inserted before the graph's storage must grow.
/// Regenerated reverb tails use OS entropy; see [`channel_with_noise`].
pub fn channel(
    graph: SignalGraph,
    format: AudioFormat,
    capacity: usize,
) -> (ChainController, ChainRenderer) {
    channel_with_noise(graph, format, capacity, entropy_noise)
}

/// Like [`channel`], drawing regenerated reverb noise from `noise`
///
/// Pass a seeded stream (see `generator::noise_stream`) for renders that
/// repeat exactly, parameter edits included.
pub fn channel_with_noise<F>(
    mut graph: SignalGraph,
    format: AudioFormat,
    capacity: usize,
    noise: F,
) -> (ChainController, ChainRenderer)
where
    F: FnMut() -> NoiseSource + Send + 'static,
{
    let capacity = capacity.max(1);
    let (command_tx, command_rx) = bounded(capacity);
    let (garbage_tx, garbage_rx) = bounded(capacity);
    let meter = Arc::new(RenderMeter::default());
    let mut noise: NoiseProvider = Box::new(noise);

    let nodes = graph
        .iter()
        .map(|(id, node)| NodeMirror::new(id.clone(), node, &mut noise))
        .collect();
    graph.reserve(capacity);

    info!(nodes = graph.len(), capacity, "Chain engine created");

    let controller = ChainController {
        commands: command_tx,
        garbage: garbage_rx,
        meter: Arc::clone(&meter),
        format,
        nodes,
        noise,
        retired: Vec::new(),
    };
    let renderer = ChainRenderer {
        graph,
        commands: command_rx,
        garbage: garbage_tx,
        meter,
    };
    (controller, renderer)
}

// ============================================================================
// CONTROL SIDE
// ============================================================================

/// Control actor: validates edits, regenerates buffers, queues commands
///
/// Every read (parameters, flags, order) is answered from the local mirror,
/// so UI code never touches the render thread.
pub struct ChainController {
    commands: Sender<Command>,
    garbage: Receiver<Garbage>,
    meter: Arc<RenderMeter>,
    format: AudioFormat,
    nodes: Vec<NodeMirror>,
    noise: NoiseProvider,
    /// Replaced derived buffers, tagged with the buffer count at swap time
    retired: Vec<(u64, RetiredBuffer)>,
}

impl ChainController {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Insert a node before `position` (past the end appends)
    pub fn insert(&mut self, id: NodeId, node: EffectNode, position: usize) -> Result<()> {
        if self.nodes.iter().any(|n| n.id == id) {
            return Err(AudioError::DuplicateNode(id.to_string()).into());
        }

        let position = position.min(self.nodes.len());
        let mirror = NodeMirror::new(id.clone(), &node, &mut self.noise);
        debug!("Queueing insert of {} node {} at {}", mirror.kind, id, position);

        self.send(Command::Insert { position, id, node })?;
        self.nodes.insert(position, mirror);
        Ok(())
    }

    pub fn push(&mut self, id: NodeId, node: EffectNode) -> Result<()> {
        let position = self.nodes.len();
        self.insert(id, node, position)
    }

    /// Remove a node; it is dropped here by a later [`collect_garbage`](Self::collect_garbage)
    pub fn remove(&mut self, id: &NodeId) -> Result<()> {
        let index = self.index_of(id)?;
        self.send(Command::Remove(index))?;
        self.nodes.remove(index);
        debug!("Queued removal of node {}", id);
        Ok(())
    }

    /// Rearrange the chain; `order` must name every node exactly once
    pub fn reorder(&mut self, order: &[NodeId]) -> Result<()> {
        let positions = permutation(self.nodes.iter().map(|n| &n.id), order)?;
        self.send(Command::Permute(positions.clone()))?;

        let mut slots: Vec<Option<NodeMirror>> = self.nodes.drain(..).map(Some).collect();
        self.nodes = positions.iter().filter_map(|&p| slots[p].take()).collect();
        debug!("Queued reorder of {} nodes", order.len());
        Ok(())
    }

    pub fn enable(&mut self, id: &NodeId) -> Result<()> {
        let index = self.index_of(id)?;
        self.send(Command::Enable(index))?;
        self.nodes[index].enabled = true;
        debug!("Node {} enabled", id);
        Ok(())
    }

    pub fn disable(&mut self, id: &NodeId) -> Result<()> {
        let index = self.index_of(id)?;
        self.send(Command::Disable(index))?;
        self.nodes[index].enabled = false;
        debug!("Node {} disabled", id);
        Ok(())
    }

    /// Select a filter mode by name
    ///
    /// Returns `Ok(false)` for unknown modes and for nodes without modes;
    /// nothing is queued in that case.
    pub fn set_mode(&mut self, id: &NodeId, mode: &str) -> Result<bool> {
        let index = self.index_of(id)?;
        let Ok(mode) = mode.parse::<FilterMode>() else {
            return Ok(false);
        };
        if self.nodes[index].kind != EffectKind::Filter {
            return Ok(false);
        }

        self.send(Command::SetMode(index, mode))?;
        self.nodes[index].mode = Some(mode);
        Ok(true)
    }

    /// Set a parameter, regenerating its derived buffer on this thread
    ///
    /// Returns the clamped value, or `None` if the node has no such
    /// parameter. The render side sees the new buffer as soon as it is
    /// published and the new value at its next buffer boundary.
    pub fn set_parameter(&mut self, id: &NodeId, name: &str, value: f32) -> Result<Option<f32>> {
        let index = self.index_of(id)?;
        let Some(spec) = self.nodes[index].params.specs().find(|spec| spec.name == name) else {
            return Ok(None);
        };
        if value.is_nan() {
            return Ok(self.nodes[index].params.get(spec.name));
        }

        let stored = spec.clamp(value);
        self.send(Command::SyncParameter {
            index,
            name: spec.name,
            value: stored,
        })?;

        let node = &mut self.nodes[index];
        node.params.set(spec.name, stored);
        if let Some(publisher) = node.publisher.as_mut() {
            if let Some(old) = publisher.rebuild(spec.name, stored) {
                trace!("Published new derived buffer for {}.{}", node.id, spec.name);
                self.retired.push((self.meter.buffers(), old));
            }
        }
        Ok(Some(stored))
    }

    /// Clear every node's signal history
    pub fn reset(&mut self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Drop everything the renderer has handed back, plus replaced derived
    /// buffers it can no longer be reading; returns how many items
    pub fn collect_garbage(&mut self) -> usize {
        let mut count = 0;
        while let Ok(item) = self.garbage.try_recv() {
            match item {
                Garbage::Node(id, node) => {
                    trace!("Dropping removed {} node {}", node.kind(), id);
                    drop(node);
                }
                Garbage::Order(order) => drop(order),
            }
            count += 1;
        }

        // A pass in flight at swap time is counted once it completes
        let processed = self.meter.buffers();
        let held = self.retired.len();
        self.retired.retain(|(mark, _)| *mark >= processed);
        count + held - self.retired.len()
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Node ids in processing order
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|n| &n.id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: &NodeId) -> Option<EffectKind> {
        self.mirror(id).map(|n| n.kind)
    }

    pub fn is_enabled(&self, id: &NodeId) -> Option<bool> {
        self.mirror(id).map(|n| n.enabled)
    }

    pub fn mode(&self, id: &NodeId) -> Option<FilterMode> {
        self.mirror(id).and_then(|n| n.mode)
    }

    /// Clamped parameter values as last set from this side
    pub fn params(&self, id: &NodeId) -> Option<&ParameterStore> {
        self.mirror(id).map(|n| &n.params)
    }

    /// Preset describing the chain as the renderer will have it
    pub fn snapshot(&self) -> ChainConfig {
        let effects = self
            .nodes
            .iter()
            .map(|n| EffectSpec {
                id: n.id.to_string(),
                effect_type: n.kind.as_str().to_string(),
                enabled: n.enabled,
                mode: n.mode.map(|m| m.as_str().to_string()),
                params: n.params.snapshot(),
            })
            .collect();

        ChainConfig {
            format: self.format,
            effects,
        }
    }

    /// Peak absolute sample of the last rendered buffer
    pub fn output_peak(&self) -> f32 {
        self.meter.peak()
    }

    /// Buffers rendered so far
    pub fn buffers_processed(&self) -> u64 {
        self.meter.buffers()
    }

    fn mirror(&self, id: &NodeId) -> Option<&NodeMirror> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    fn index_of(&self, id: &NodeId) -> Result<usize> {
        self.nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| AudioError::NodeNotFound(id.to_string()).into())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => {
                warn!("Chain command queue full, dropping edit");
                EngineError::QueueFull
            }
            TrySendError::Disconnected(_) => EngineError::Disconnected,
        })
    }
}

// ============================================================================
// RENDER SIDE
// ============================================================================

/// Render actor: owns the graph and runs one buffer at a time
pub struct ChainRenderer {
    graph: SignalGraph,
    commands: Receiver<Command>,
    garbage: Sender<Garbage>,
    meter: Arc<RenderMeter>,
}

impl ChainRenderer {
    /// Apply pending edits, then process `buffer` in place
    ///
    /// Never blocks. Call once per audio callback.
    pub fn process(&mut self, buffer: &mut [f32]) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
        self.graph.process(buffer);
        self.meter.record(buffer);
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    /// Take the graph back, e.g. after the audio stream stopped
    pub fn into_graph(mut self) -> SignalGraph {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
        self.graph
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Insert { position, id, node } => {
                if let Err(err) = self.graph.insert(id, node, position) {
                    trace!("Insert rejected: {}", err);
                }
            }
            Command::Remove(index) => {
                if let Some((id, node)) = self.graph.remove_at(index) {
                    self.discard(Garbage::Node(id, node));
                }
            }
            Command::Permute(mut order) => {
                if let Err(err) = self.graph.permute(&mut order) {
                    trace!("Reorder rejected: {}", err);
                }
                self.discard(Garbage::Order(order));
            }
            Command::Enable(index) => {
                if let Some(node) = self.graph.node_at_mut(index) {
                    node.enable();
                }
            }
            Command::Disable(index) => {
                if let Some(node) = self.graph.node_at_mut(index) {
                    node.disable();
                }
            }
            Command::SetMode(index, mode) => {
                if let Some(node) = self.graph.node_at_mut(index) {
                    node.set_filter_mode(mode);
                }
            }
            Command::SyncParameter { index, name, value } => {
                if let Some(node) = self.graph.node_at_mut(index) {
                    node.sync_parameter(name, value);
                }
            }
            Command::Reset => self.graph.reset(),
        }
    }

    /// Hand a value back to the control thread, dropping it here only if
    /// the return queue is full or gone
    fn discard(&self, item: Garbage) {
        if let Err(err) = self.garbage.try_send(item) {
            trace!("Garbage queue unavailable, dropping on render thread");
            drop(err.into_inner());
        }
    }
}
