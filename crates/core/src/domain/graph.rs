//! Ordered effect chain and the per-buffer processing pass
//!
//! Insertion order is processing order. Structural edits (insert, remove,
//! reorder, enable, disable) take `&mut self`, so the borrow checker keeps
//! them out of an in-flight `process` call; moving edits across threads is
//! the job of `fxgraph-infra`.

use crate::domain::audio::{AudioError, Result};
use crate::domain::dsp::{Effect, EffectNode};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Unique identifier for a node within one chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Ordered sequence of effect nodes
#[derive(Debug, Default)]
pub struct SignalGraph {
    nodes: Vec<(NodeId, EffectNode)>,
}

impl SignalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node at the end of the chain
    pub fn push(&mut self, id: NodeId, node: EffectNode) -> Result<()> {
        let position = self.nodes.len();
        self.insert(id, node, position)
    }

    /// Insert a node before `position`
    ///
    /// Positions past the end append.
    pub fn insert(&mut self, id: NodeId, node: EffectNode, position: usize) -> Result<()> {
        if self.contains(&id) {
            return Err(AudioError::DuplicateNode(id.to_string()));
        }

        let position = position.min(self.nodes.len());
        trace!("Inserting {} node {} at position {}", node.kind(), id, position);
        self.nodes.insert(position, (id, node));
        Ok(())
    }

    /// Remove a node, handing it back to the caller
    pub fn remove(&mut self, id: &NodeId) -> Result<EffectNode> {
        let index = self.index_of(id)?;
        trace!("Removing node {}", id);
        let (_, node) = self.nodes.remove(index);
        Ok(node)
    }

    /// Rearrange the chain into `order`
    ///
    /// `order` must name every node exactly once. On error the chain is left
    /// unchanged.
    pub fn reorder(&mut self, order: &[NodeId]) -> Result<()> {
        let mut positions = permutation(self.ids(), order)?;
        self.permute(&mut positions)
    }

    /// Rearrange so that new position `i` holds the node now at `order[i]`
    ///
    /// Runs in place without allocating; `order` is consumed as scratch
    /// space. Fails, leaving the chain unchanged, if `order` is not a
    /// permutation of `0..len`.
    pub fn permute(&mut self, order: &mut [usize]) -> Result<()> {
        let len = self.nodes.len();
        if order.len() != len {
            return Err(AudioError::InvalidOrder(format!(
                "expected {} positions, got {}",
                len,
                order.len()
            )));
        }
        for (i, &position) in order.iter().enumerate() {
            if position >= len || order[..i].contains(&position) {
                return Err(AudioError::InvalidOrder(format!("bad position {}", position)));
            }
        }

        // Follow each cycle once, marking visited slots
        const DONE: usize = usize::MAX;
        for start in 0..len {
            if order[start] == DONE {
                continue;
            }
            let mut i = start;
            loop {
                let next = order[i];
                order[i] = DONE;
                if next == start {
                    break;
                }
                self.nodes.swap(i, next);
                i = next;
            }
        }

        trace!("Chain permuted ({} nodes)", len);
        Ok(())
    }

    /// Remove the node at `index`, with its id
    pub fn remove_at(&mut self, index: usize) -> Option<(NodeId, EffectNode)> {
        if index < self.nodes.len() {
            Some(self.nodes.remove(index))
        } else {
            None
        }
    }

    pub fn node_at_mut(&mut self, index: usize) -> Option<&mut EffectNode> {
        self.nodes.get_mut(index).map(|(_, node)| node)
    }

    /// Make room for `additional` more nodes without reallocating
    pub fn reserve(&mut self, additional: usize) {
        self.nodes.reserve(additional);
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&EffectNode> {
        self.nodes.iter().find(|(node_id, _)| node_id == id).map(|(_, node)| node)
    }

    pub fn get_node_mut(&mut self, id: &NodeId) -> Option<&mut EffectNode> {
        self.nodes
            .iter_mut()
            .find(|(node_id, _)| node_id == id)
            .map(|(_, node)| node)
    }

    pub fn enable(&mut self, id: &NodeId) -> Result<()> {
        self.node_mut(id)?.enable();
        trace!("Node {} enabled", id);
        Ok(())
    }

    pub fn disable(&mut self, id: &NodeId) -> Result<()> {
        self.node_mut(id)?.disable();
        trace!("Node {} disabled", id);
        Ok(())
    }

    /// Set a parameter on one node
    ///
    /// Returns the clamped value stored, `None` if the node has no such
    /// parameter.
    pub fn set_parameter(&mut self, id: &NodeId, name: &str, value: f32) -> Result<Option<f32>> {
        Ok(self.node_mut(id)?.set_parameter(name, value))
    }

    /// Run `buffer` through every enabled node in chain order
    pub fn process(&mut self, buffer: &mut [f32]) {
        for (_, node) in self.nodes.iter_mut() {
            if node.is_enabled() {
                node.process(buffer);
            }
        }
    }

    /// Clear the signal history of every node
    pub fn reset(&mut self) {
        for (_, node) in self.nodes.iter_mut() {
            node.reset();
        }
    }

    /// Total latency of the enabled nodes, in frames
    pub fn latency_samples(&self) -> usize {
        self.nodes
            .iter()
            .filter(|(_, node)| node.is_enabled())
            .map(|(_, node)| node.latency_samples())
            .sum()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|(node_id, _)| node_id == id)
    }

    /// Node ids in processing order
    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &EffectNode)> {
        self.nodes.iter().map(|(id, node)| (id, node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn index_of(&self, id: &NodeId) -> Result<usize> {
        self.nodes
            .iter()
            .position(|(node_id, _)| node_id == id)
            .ok_or_else(|| AudioError::NodeNotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: &NodeId) -> Result<&mut EffectNode> {
        self.get_node_mut(id)
            .ok_or_else(|| AudioError::NodeNotFound(id.to_string()))
    }
}

/// Positions that turn the chain `current` into `order`
///
/// Entry `i` of the result is the current index of `order[i]`. Fails unless
/// `order` names every id of `current` exactly once.
pub fn permutation<'a, I>(current: I, order: &[NodeId]) -> Result<Vec<usize>>
where
    I: IntoIterator<Item = &'a NodeId>,
{
    let current: Vec<&NodeId> = current.into_iter().collect();
    if order.len() != current.len() {
        return Err(AudioError::InvalidOrder(format!(
            "expected {} ids, got {}",
            current.len(),
            order.len()
        )));
    }

    let mut positions = Vec::with_capacity(order.len());
    for (i, id) in order.iter().enumerate() {
        if order[..i].contains(id) {
            return Err(AudioError::InvalidOrder(format!("{} listed twice", id)));
        }
        let position = current
            .iter()
            .position(|existing| *existing == id)
            .ok_or_else(|| AudioError::InvalidOrder(format!("{} is not in the chain", id)))?;
        positions.push(position);
    }
    Ok(positions)
}
