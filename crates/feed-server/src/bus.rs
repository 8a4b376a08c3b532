// In-memory activity bus
//
// Every published event is fanned out to all live subscribers (each feed
// connection filters by tenant) and recorded in a bounded per-tenant
// history used by the activities API. Both the events per tenant and the
// number of tenants are capped; past the tenant cap the tenant that
// published least recently loses its history.

use std::collections::{HashMap, VecDeque};

use docflow_feed_core::Event;
use parking_lot::RwLock;
use tokio::sync::broadcast;

/// Reported to feed clients in the `ready` message
pub const BUS_TYPE: &str = "memory";

const FANOUT_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct TenantHistory {
    events: VecDeque<Event>,
    /// Publish sequence number of the newest event
    last_publish: u64,
}

#[derive(Debug, Default)]
struct History {
    tenants: HashMap<String, TenantHistory>,
    sequence: u64,
}

#[derive(Debug)]
pub struct ActivityBus {
    sender: broadcast::Sender<Event>,
    history: RwLock<History>,
    history_limit: usize,
    max_tenants: usize,
}

impl ActivityBus {
    pub fn new(history_limit: usize, max_tenants: usize) -> Self {
        let (sender, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            sender,
            history: RwLock::new(History::default()),
            history_limit: history_limit.max(1),
            max_tenants: max_tenants.max(1),
        }
    }

    /// Record and fan out an event; returns the number of live subscribers
    pub fn publish(&self, event: Event) -> usize {
        {
            let mut history = self.history.write();
            history.sequence += 1;
            let sequence = history.sequence;

            if !history.tenants.contains_key(&event.tenant_id)
                && history.tenants.len() >= self.max_tenants
            {
                evict_least_recent(&mut history.tenants);
            }

            let recent = history.tenants.entry(event.tenant_id.clone()).or_default();
            recent.events.push_front(event.clone());
            recent.events.truncate(self.history_limit);
            recent.last_publish = sequence;
        }

        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::debug!(subscribers = delivered, "Activity published");
        delivered
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Most recent events of `tenant_id`, newest first
    pub fn recent(&self, tenant_id: &str, limit: usize) -> Vec<Event> {
        self.history
            .read()
            .tenants
            .get(tenant_id)
            .map(|recent| recent.events.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of retained events for `tenant_id`
    pub fn count(&self, tenant_id: &str) -> usize {
        self.history
            .read()
            .tenants
            .get(tenant_id)
            .map_or(0, |recent| recent.events.len())
    }

    /// Number of tenants with retained history
    pub fn tenant_count(&self) -> usize {
        self.history.read().tenants.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn evict_least_recent(tenants: &mut HashMap<String, TenantHistory>) {
    let oldest = tenants
        .iter()
        .min_by_key(|(_, recent)| recent.last_publish)
        .map(|(tenant_id, _)| tenant_id.clone());

    if let Some(tenant_id) = oldest {
        tenants.remove(&tenant_id);
        tracing::info!(tenant_id = %tenant_id, "Tenant history evicted");
    }
}
