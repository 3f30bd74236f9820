//! SignalK delta model.
//!
//! Output nodes publish their values as SignalK deltas. Values are collected
//! in a [`DeltaQueue`] and drained into a single [`Delta`] whenever the
//! transport is ready to send.

use std::cell::{Cell, RefCell};

use serde::Serialize;

use crate::observable::ObservableValue;

/// Context every delta from this node is published under.
pub const SELF_CONTEXT: &str = "vessels.self";

/// One drained batch, ready to serialize and send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    pub context: String,
    pub updates: Vec<Update>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Update {
    /// Label of the producing node, e.g. `sknode.ina219`.
    #[serde(rename = "$source")]
    pub source: String,

    /// RFC 3339, UTC, millisecond precision.
    pub timestamp: String,

    pub values: Vec<PathValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathValue {
    pub path: String,
    pub value: serde_json::Value,
}

/// Values waiting to be sent.
///
/// Only the latest value per path is kept. Every drain publishes the number
/// of values it flushed on [`delta_count`](DeltaQueue::delta_count), which the
/// status indicator uses as its activity input.
#[derive(Debug)]
pub struct DeltaQueue {
    source: String,
    pending: RefCell<Vec<PathValue>>,
    delta_count: ObservableValue<i32>,
    total_sent: Cell<u64>,
}

impl DeltaQueue {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pending: RefCell::new(Vec::new()),
            delta_count: ObservableValue::new(0),
            total_sent: Cell::new(0),
        }
    }

    /// Queue a value, replacing any queued value for the same path.
    pub fn append(&self, path: &str, value: serde_json::Value) {
        let mut pending = self.pending.borrow_mut();
        match pending.iter_mut().find(|pv| pv.path == path) {
            Some(existing) => existing.value = value,
            None => pending.push(PathValue {
                path: path.to_string(),
                value,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Drain every queued value into one delta. `None` if nothing is queued.
    pub fn take_delta(&self) -> Option<Delta> {
        let values: Vec<PathValue> = self.pending.borrow_mut().drain(..).collect();
        if values.is_empty() {
            return None;
        }

        let flushed = values.len();
        let delta = Delta {
            context: SELF_CONTEXT.to_string(),
            updates: vec![Update {
                source: self.source.clone(),
                timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                values,
            }],
        };

        self.total_sent
            .set(self.total_sent.get() + flushed as u64);
        self.delta_count
            .set(i32::try_from(flushed).unwrap_or(i32::MAX));
        Some(delta)
    }

    /// Number of values flushed by the most recent drain.
    pub fn delta_count(&self) -> &ObservableValue<i32> {
        &self.delta_count
    }

    /// Values flushed since creation.
    pub fn total_sent(&self) -> u64 {
        self.total_sent.get()
    }
}
