//! Role → order handle mapping.
//!
//! The controller resolves every notification through its role tag and the
//! handle stored here, never through order object identity.

use crate::domain::{OrderId, OrderRole};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct RoleHandles {
    live: BTreeMap<OrderRole, OrderId>,
}

impl RoleHandles {
    pub fn set(&mut self, role: OrderRole, id: OrderId) -> Option<OrderId> {
        self.live.insert(role, id)
    }

    pub fn get(&self, role: OrderRole) -> Option<OrderId> {
        self.live.get(&role).copied()
    }

    pub fn take(&mut self, role: OrderRole) -> Option<OrderId> {
        self.live.remove(&role)
    }

    /// Whether `id` is the handle currently stored for `role`.
    pub fn is_current(&self, role: OrderRole, id: OrderId) -> bool {
        self.get(role) == Some(id)
    }

    pub fn roles(&self) -> Vec<OrderRole> {
        self.live.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }
}
