//! Per-run store of captured step results.

use crate::types::StepResult;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Step results of one run keyed by step order. Entries are written once and
/// a step only ever sees entries of strictly earlier orders.
#[derive(Debug, Default)]
pub struct RunContext {
    results: BTreeMap<u32, StepResult>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a step result. Returns `false` if that order was already recorded,
    /// in which case the first entry is kept.
    pub fn record(&mut self, result: StepResult) -> bool {
        match self.results.entry(result.order) {
            Entry::Vacant(slot) => {
                slot.insert(result);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    #[must_use]
    pub fn get(&self, order: u32) -> Option<&StepResult> {
        self.results.get(&order)
    }

    /// Response body of step `from` as seen by step `reader`.
    #[must_use]
    pub fn response_for(&self, from: u32, reader: u32) -> Option<&Value> {
        if from >= reader {
            return None;
        }
        self.results.get(&from).map(|r| &r.response_body)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Step;
    use serde_json::json;

    fn captured(order: u32, body: Value) -> StepResult {
        let mut result = StepResult::pending(&Step::new(order, "GET", "/"));
        result.response_body = body;
        result
    }

    #[test]
    fn test_record_is_write_once() {
        let mut ctx = RunContext::new();
        assert!(ctx.record(captured(1, json!({"v": 1}))));
        assert!(!ctx.record(captured(1, json!({"v": 2}))));
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get(1).map(|r| &r.response_body), Some(&json!({"v": 1})));
    }

    #[test]
    fn test_response_for_only_sees_earlier_steps() {
        let mut ctx = RunContext::new();
        ctx.record(captured(1, json!({"a": 1})));
        ctx.record(captured(2, json!({"b": 2})));

        assert_eq!(ctx.response_for(1, 2), Some(&json!({"a": 1})));
        assert_eq!(ctx.response_for(2, 2), None);
        assert_eq!(ctx.response_for(2, 1), None);
        assert_eq!(ctx.response_for(5, 9), None);
    }
}
