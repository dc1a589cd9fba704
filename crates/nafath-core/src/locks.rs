//! Per-flow mutual exclusion for read-modify-write sequences

use crate::types::FlowId;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per flow id, created on first use
#[derive(Debug, Default)]
pub struct FlowLocks {
    locks: DashMap<FlowId, Arc<Mutex<()>>>,
}

impl FlowLocks {
    /// Create empty lock table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `flow`
    pub async fn lock(&self, flow: &FlowId) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(flow.clone()).or_default().clone();
        mutex.lock_owned().await
    }

    /// Number of flows seen so far
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Check if no flow has been locked yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_flow_is_exclusive() {
        let locks = Arc::new(FlowLocks::new());
        let flow = FlowId::default();

        let guard = locks.lock(&flow).await;
        let contender = {
            let locks = locks.clone();
            let flow = flow.clone();
            tokio::spawn(async move {
                let _g = locks.lock(&flow).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_flows_do_not_block() {
        let locks = FlowLocks::new();
        let _a = locks.lock(&FlowId::new("a").unwrap()).await;
        let _b = locks.lock(&FlowId::new("b").unwrap()).await;
        assert_eq!(locks.len(), 2);
    }
}
