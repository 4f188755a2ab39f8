use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::model::{AgentRecord, Command, Hostname};
use crate::protocol::ClientInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    New,
    Updated,
}

#[derive(Debug, Default)]
struct RegistryInner {
    agents: BTreeMap<Hostname, AgentRecord>,
    /// One slot per agent; a later command replaces an unread one
    pending: HashMap<Hostname, Command>,
}

/// Known agents and their pending-command slots.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    inner: Mutex<RegistryInner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent by hostname. A repeat only refreshes the ip address.
    pub fn register(&self, hostname: Hostname, ip_address: String, now: DateTime<Utc>) -> Registration {
        let mut inner = self.inner.lock();
        match inner.agents.get_mut(&hostname) {
            Some(record) => {
                record.ip_address = ip_address;
                Registration::Updated
            }
            None => {
                let record = AgentRecord::new(hostname.clone(), ip_address, now);
                inner.agents.insert(hostname, record);
                Registration::New
            }
        }
    }

    pub fn contains(&self, hostname: &Hostname) -> bool {
        self.inner.lock().agents.contains_key(hostname)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn agents(&self) -> Vec<AgentRecord> {
        self.inner.lock().agents.values().cloned().collect()
    }

    pub fn clients(&self) -> BTreeMap<Hostname, ClientInfo> {
        self.inner
            .lock()
            .agents
            .iter()
            .map(|(hostname, record)| {
                let info = ClientInfo {
                    ip_address: record.ip_address.clone(),
                };
                (hostname.clone(), info)
            })
            .collect()
    }

    /// Fill every registered agent's slot with `command`. Returns how many.
    pub fn broadcast(&self, command: Command) -> usize {
        let mut inner = self.inner.lock();
        let hosts: Vec<Hostname> = inner.agents.keys().cloned().collect();
        for host in &hosts {
            inner.pending.insert(host.clone(), command);
        }
        hosts.len()
    }

    /// Destructive read of an agent's slot. Unknown agents are always told
    /// to re-register.
    pub fn take_command(&self, hostname: Option<&Hostname>) -> Option<Command> {
        let mut inner = self.inner.lock();
        match hostname {
            Some(host) if inner.agents.contains_key(host) => inner.pending.remove(host),
            _ => Some(Command::ReRegister),
        }
    }
}
