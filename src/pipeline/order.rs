//! Versioned gate order with atomic publication.
//!
//! Readers take an `Arc` snapshot once per tick and keep using it even if a
//! reorder is published meanwhile, so a single `process_*` call never sees a
//! mixed order.

use crate::error::{EngineError, Result};
use crate::types::GateId;
use std::sync::{Arc, RwLock};

/// Execution order of the gates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOrder {
    pub version: u64,
    pub gates: Vec<GateId>,
}

impl PipelineOrder {
    /// Declaration order `0..n`
    pub fn declaration(n: usize) -> Self {
        Self {
            version: 0,
            gates: (0..n as u32).map(GateId).collect(),
        }
    }

    /// Whether `gates` is a permutation of `0..n`
    pub fn is_permutation_of(gates: &[GateId], n: usize) -> bool {
        if gates.len() != n {
            return false;
        }
        let mut seen = vec![false; n];
        for g in gates {
            match seen.get_mut(g.index()) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}

/// Shared, swappable [`PipelineOrder`]
#[derive(Debug)]
pub struct OrderCell {
    inner: RwLock<Arc<PipelineOrder>>,
    len: usize,
}

impl OrderCell {
    pub fn new(n: usize) -> Self {
        Self {
            inner: RwLock::new(Arc::new(PipelineOrder::declaration(n))),
            len: n,
        }
    }

    /// Current order; cheap `Arc` clone
    pub fn snapshot(&self) -> Arc<PipelineOrder> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publish a new order, bumping the version. Returns the new version.
    pub fn publish(&self, gates: Vec<GateId>) -> Result<u64> {
        if !PipelineOrder::is_permutation_of(&gates, self.len) {
            return Err(EngineError::Config(format!(
                "gate order {:?} is not a permutation of {} gates",
                gates, self.len
            )));
        }
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = guard.version + 1;
        *guard = Arc::new(PipelineOrder { version, gates });
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_bumps_version() {
        let cell = OrderCell::new(3);
        let before = cell.snapshot();
        assert_eq!(before.gates, vec![GateId(0), GateId(1), GateId(2)]);

        let v = cell.publish(vec![GateId(2), GateId(0), GateId(1)]).unwrap();
        assert_eq!(v, 1);
        // Old snapshot is unaffected
        assert_eq!(before.version, 0);
        assert_eq!(cell.snapshot().gates[0], GateId(2));
    }

    #[test]
    fn test_publish_rejects_non_permutation() {
        let cell = OrderCell::new(3);
        assert!(cell.publish(vec![GateId(0), GateId(0), GateId(1)]).is_err());
        assert!(cell.publish(vec![GateId(0), GateId(1)]).is_err());
        assert!(cell.publish(vec![GateId(0), GateId(1), GateId(7)]).is_err());
        assert_eq!(cell.snapshot().version, 0);
    }
}
