// Per-track undo history.
//
// Each track keeps a stack of full-content snapshots, oldest first. The top
// is always the last content this daemon observed or wrote. Stacks are
// unbounded and live for the lifetime of the process.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("nothing to undo")]
pub struct NothingToUndo;

#[derive(Debug, Default)]
pub struct HistoryStore {
    stacks: Mutex<HashMap<String, Vec<String>>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `content` unless it equals the current top.
    /// Returns true when a new entry was recorded.
    pub fn push(&self, name: &str, content: &str) -> bool {
        let mut stacks = self.stacks.lock().expect("history lock poisoned");
        let stack = stacks.entry(name.to_string()).or_default();
        if stack.last().is_some_and(|top| top == content) {
            return false;
        }
        stack.push(content.to_string());
        true
    }

    /// Number of prior versions reachable through undo.
    pub fn depth(&self, name: &str) -> usize {
        let stacks = self.stacks.lock().expect("history lock poisoned");
        stacks.get(name).map_or(0, |stack| stack.len().saturating_sub(1))
    }

    /// The version `undo` would restore, without touching the stack.
    pub fn previous(&self, name: &str) -> Result<String, NothingToUndo> {
        let stacks = self.stacks.lock().expect("history lock poisoned");
        match stacks.get(name) {
            Some(stack) if stack.len() > 1 => Ok(stack[stack.len() - 2].clone()),
            _ => Err(NothingToUndo),
        }
    }

    /// Pop the current version and return the one beneath it.
    pub fn undo(&self, name: &str) -> Result<String, NothingToUndo> {
        let mut stacks = self.stacks.lock().expect("history lock poisoned");
        let stack = stacks.get_mut(name).filter(|stack| stack.len() > 1).ok_or(NothingToUndo)?;
        stack.pop();
        stack.last().cloned().ok_or(NothingToUndo)
    }

    /// Forget a track entirely (its file was deleted).
    pub fn drop_track(&self, name: &str) {
        self.stacks.lock().expect("history lock poisoned").remove(name);
    }

    /// Latest known content for a track.
    pub fn current(&self, name: &str) -> Option<String> {
        let stacks = self.stacks.lock().expect("history lock poisoned");
        stacks.get(name).and_then(|stack| stack.last().cloned())
    }
}
