//! Evaluation scope
//!
//! While a derived node's computation runs, every value it pulls through the
//! evaluation context is recorded into a scoped frame. When the computation
//! finishes, the frame is committed wholesale as the node's dependency set.
//!
//! The stack is owned by the container, never a process-wide global, and it
//! doubles as the cycle detector: pushing a key that is already somewhere on
//! the stack means a node is being evaluated while its own evaluation is in
//! progress, which is a wiring bug the graph fails fast on.
//!
//! Frames are keyed by the evaluating thread. An async result settling on a
//! runtime worker drives dependent re-evaluation there, and its frames must
//! not interleave with an evaluation in progress on another thread; each
//! thread pushes, records, and pops only its own frames. Cycles always recur
//! on a single thread, so per-thread detection loses nothing.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use super::error::GraphError;
use super::key::NodeKey;

#[derive(Debug)]
struct Frame {
    key: NodeKey,
    reads: Vec<NodeKey>,
}

/// Per-thread stacks of in-progress evaluations with per-frame read recording.
#[derive(Debug, Default)]
pub(crate) struct EvalStack {
    frames: Mutex<HashMap<ThreadId, Vec<Frame>>>,
}

impl EvalStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Begin evaluating `key` on the current thread. Fails fast if `key` is
    /// already being evaluated here.
    pub(crate) fn push(&self, key: NodeKey) -> Result<(), GraphError> {
        let mut by_thread = self.frames.lock();
        let frames = by_thread.entry(thread::current().id()).or_default();
        if frames.iter().any(|frame| frame.key == key) {
            return Err(GraphError::CycleDetected(key.id));
        }
        frames.push(Frame {
            key,
            reads: Vec::new(),
        });
        Ok(())
    }

    /// Record a read made by the current thread's innermost evaluation, if
    /// one is active.
    pub(crate) fn record(&self, dep: NodeKey) {
        let mut by_thread = self.frames.lock();
        if let Some(frame) = by_thread
            .get_mut(&thread::current().id())
            .and_then(|frames| frames.last_mut())
        {
            frame.reads.push(dep);
        }
    }

    /// Finish the current thread's innermost evaluation and return the reads
    /// it made. The frame must belong to `expected`.
    pub(crate) fn pop(&self, expected: &NodeKey) -> Vec<NodeKey> {
        let mut by_thread = self.frames.lock();
        let id = thread::current().id();
        let Some(frames) = by_thread.get_mut(&id) else {
            debug_assert!(false, "pop without a pushed frame");
            return Vec::new();
        };
        let frame = frames.pop();
        if frames.is_empty() {
            by_thread.remove(&id);
        }
        match frame {
            Some(frame) => {
                debug_assert_eq!(frame.key, *expected, "popped a foreign frame");
                frame.reads
            }
            None => {
                debug_assert!(false, "pop without a pushed frame");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::key::ProviderId;

    fn key() -> NodeKey {
        NodeKey::plain(ProviderId::next())
    }

    #[test]
    fn pop_returns_recorded_reads() {
        let stack = EvalStack::new();
        let node = key();
        let dep_a = key();
        let dep_b = key();

        stack.push(node.clone()).unwrap();
        stack.record(dep_a.clone());
        stack.record(dep_b.clone());

        assert_eq!(stack.pop(&node), vec![dep_a, dep_b]);
    }

    #[test]
    fn repushing_an_active_key_is_a_cycle() {
        let stack = EvalStack::new();
        let node = key();

        stack.push(node.clone()).unwrap();
        let err = stack.push(node.clone()).unwrap_err();
        assert_eq!(err, GraphError::CycleDetected(node.id));
    }

    #[test]
    fn nested_frames_record_independently() {
        let stack = EvalStack::new();
        let outer = key();
        let inner = key();
        let outer_dep = key();
        let inner_dep = key();

        stack.push(outer.clone()).unwrap();
        stack.record(outer_dep.clone());

        stack.push(inner.clone()).unwrap();
        stack.record(inner_dep.clone());
        assert_eq!(stack.pop(&inner), vec![inner_dep]);

        // Back in the outer frame, its reads are untouched.
        stack.record(outer_dep.clone());
        assert_eq!(stack.pop(&outer), vec![outer_dep.clone(), outer_dep]);
    }

    #[test]
    fn record_without_a_frame_is_a_no_op() {
        let stack = EvalStack::new();
        let stray = key();
        stack.record(stray.clone());

        // A frame opened afterwards does not inherit the stray read.
        let node = key();
        stack.push(node.clone()).unwrap();
        assert!(stack.pop(&node).is_empty());
    }

    #[test]
    fn frames_are_scoped_per_thread() {
        let stack = std::sync::Arc::new(EvalStack::new());
        let here = key();
        let here_dep = key();
        let there = key();
        let there_dep = key();

        stack.push(here.clone()).unwrap();
        stack.record(here_dep.clone());

        // A frame opened on another thread neither sees this thread's frame
        // nor receives its reads.
        let stack_clone = stack.clone();
        let there_clone = there.clone();
        let there_dep_clone = there_dep.clone();
        let reads = std::thread::spawn(move || {
            stack_clone.push(there_clone.clone()).unwrap();
            stack_clone.record(there_dep_clone);
            stack_clone.pop(&there_clone)
        })
        .join()
        .unwrap();
        assert_eq!(reads, vec![there_dep]);

        stack.record(here_dep.clone());
        assert_eq!(stack.pop(&here), vec![here_dep.clone(), here_dep]);
    }
}
