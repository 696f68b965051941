#![deny(missing_docs)]
//! Hook manager and chaining for axon.
//!
//! The [`HookManager`] collects [`LifecycleHook`] implementations into an
//! ordered pipeline. At each of the nine hook points, hooks run in
//! registration order and each sees the output of the previous one; a
//! `None` return means "no change". The tool gate short-circuits on
//! `Skip` or `Interrupt`. A hook that returns an error is logged and
//! bypassed for the remainder of the run — hook failures never abort
//! execution.

use axon_types::{
    ContextMetadata, ExecutionFrame, HookError, LifecycleHook, Message, ToolCall, ToolGate,
    ToolResult,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// The manager's resolved verdict for one tool call.
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Execute this (possibly hook-replaced) call.
    Proceed(ToolCall),
    /// Skip the call and backfill a synthetic result.
    Skip {
        /// Why the call was skipped.
        reason: String,
    },
    /// Pause the run before the call executes.
    Interrupt {
        /// Why execution paused.
        reason: String,
        /// Whether resumption needs fresh user input.
        requires_user_input: bool,
    },
}

/// An ordered pipeline of lifecycle hooks.
pub struct HookManager {
    hooks: Vec<Arc<dyn LifecycleHook>>,
    bypassed: Mutex<HashSet<usize>>,
}

impl HookManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            bypassed: Mutex::new(HashSet::new()),
        }
    }

    /// Add a hook to the end of the pipeline.
    pub fn add(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Clear the failure bypass set. Called at the start of each run.
    pub fn reset_bypassed(&self) {
        self.bypassed.lock().unwrap().clear();
    }

    fn is_bypassed(&self, index: usize) -> bool {
        self.bypassed.lock().unwrap().contains(&index)
    }

    fn bypass(&self, index: usize, name: &str, error: HookError) {
        tracing::warn!(hook = name, error = %error, "hook failed; bypassing for the rest of the run");
        self.bypassed.lock().unwrap().insert(index);
    }

    /// Hook point 1: entering a new iteration.
    pub async fn before_iteration_start(&self, frame: ExecutionFrame) -> ExecutionFrame {
        let mut current = frame;
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.before_iteration_start(&current).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }

    /// Hook point 2: before context assembly.
    pub async fn before_context_assembly(&self, frame: ExecutionFrame) -> ExecutionFrame {
        let mut current = frame;
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.before_context_assembly(&current).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }

    /// Hook point 3: after context assembly.
    pub async fn after_context_assembly(
        &self,
        frame: &ExecutionFrame,
        snapshot: String,
        metadata: ContextMetadata,
    ) -> (String, ContextMetadata) {
        let mut current = (snapshot, metadata);
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook
                .after_context_assembly(frame, &current.0, &current.1)
                .await
            {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }

    /// Hook point 4: before the model call.
    pub async fn before_llm_call(
        &self,
        frame: &ExecutionFrame,
        messages: Vec<Message>,
    ) -> Vec<Message> {
        let mut current = messages;
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.before_llm_call(frame, &current).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }

    /// Hook point 5: after the model responds.
    pub async fn after_llm_response(
        &self,
        frame: &ExecutionFrame,
        text: String,
        calls: Vec<ToolCall>,
    ) -> (String, Vec<ToolCall>) {
        let mut current = (text, calls);
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.after_llm_response(frame, &current.0, &current.1).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }

    /// Hook point 6: the per-call tool gate. Runs inside the orchestrator.
    /// `Skip` and `Interrupt` short-circuit the chain.
    pub async fn before_tool_execution(
        &self,
        frame: &ExecutionFrame,
        call: ToolCall,
    ) -> GateDecision {
        let mut current = call;
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.before_tool_execution(frame, &current).await {
                Ok(ToolGate::Proceed(None)) => {}
                Ok(ToolGate::Proceed(Some(replacement))) => current = replacement,
                Ok(ToolGate::Skip { reason }) => return GateDecision::Skip { reason },
                Ok(ToolGate::Interrupt {
                    reason,
                    requires_user_input,
                }) => {
                    return GateDecision::Interrupt {
                        reason,
                        requires_user_input,
                    };
                }
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        GateDecision::Proceed(current)
    }

    /// Hook point 7: after each tool call completes.
    pub async fn after_tool_execution(
        &self,
        frame: &ExecutionFrame,
        result: ToolResult,
    ) -> ToolResult {
        let mut current = result;
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.after_tool_execution(frame, &current).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }

    /// Hook point 8: before tail recursion.
    pub async fn before_recursion(
        &self,
        frame: &ExecutionFrame,
        next_frame: ExecutionFrame,
    ) -> ExecutionFrame {
        let mut current = next_frame;
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.before_recursion(frame, &current).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }

    /// Hook point 9: after the iteration finishes.
    pub async fn after_iteration_end(&self, frame: ExecutionFrame) -> ExecutionFrame {
        let mut current = frame;
        for (i, hook) in self.hooks.iter().enumerate() {
            if self.is_bypassed(i) {
                continue;
            }
            match hook.after_iteration_end(&current).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(e) => self.bypass(i, hook.name(), e),
            }
        }
        current
    }
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new()
    }
}
