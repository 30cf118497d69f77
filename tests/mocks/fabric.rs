//! Mock fabric collaborators.
//!
//! Provides configurable implementations that simulate:
//! - Fabric API responses per object class (healthy, degraded, failing)
//! - Terminal sessions to switches (reachable or refusing connections)

use fabric_preflight::platform::api::FabricApi;
use fabric_preflight::platform::session::{SessionFactory, TerminalSession};
use fabric_preflight::platform::PlatformError;
use fabric_preflight::Credentials;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory fabric API keyed by object class.
#[derive(Default)]
pub struct MockApi {
    objects: HashMap<String, Vec<Value>>,
    failures: HashMap<String, PlatformError>,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(mut self, kind: &str, objects: Vec<Value>) -> Self {
        self.objects.insert(kind.to_string(), objects);
        self
    }

    pub fn with_failure(mut self, kind: &str, error: PlatformError) -> Self {
        self.failures.insert(kind.to_string(), error);
        self
    }

    /// Classes fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// A fabric with two fully fit controllers and two active leaves on one version.
    pub fn healthy() -> Self {
        MockApi::new()
            .with_objects("firmwareCtrlrRunning", vec![controller_firmware("5.2(7f)")])
            .with_objects(
                "firmwareRunning",
                vec![switch_firmware("101", "n9000-15.2(7f)"), switch_firmware("102", "n9000-15.2(7f)")],
            )
            .with_objects(
                "fabricNode",
                vec![
                    fabric_node("1", "controller", "unknown", "10.0.0.1"),
                    fabric_node("101", "leaf", "active", "10.0.1.101"),
                    fabric_node("102", "leaf", "active", "10.0.1.102"),
                ],
            )
            .with_objects("infraWiNode", vec![cluster_node("1", "fully-fit"), cluster_node("2", "fully-fit")])
    }
}

impl FabricApi for MockApi {
    fn fetch(&self, kind: &str, _query: &str) -> Result<Vec<Value>, PlatformError> {
        self.calls.lock().unwrap().push(kind.to_string());
        if let Some(error) = self.failures.get(kind) {
            return Err(error.clone());
        }
        Ok(self.objects.get(kind).cloned().unwrap_or_default())
    }
}

pub fn controller_firmware(version: &str) -> Value {
    json!({"firmwareCtrlrRunning": {"attributes": {
        "dn": "topology/pod-1/node-1/sys/ctrlrfwstatuscont/ctrlrrunning",
        "version": version
    }}})
}

pub fn switch_firmware(node: &str, version: &str) -> Value {
    json!({"firmwareRunning": {"attributes": {
        "dn": format!("topology/pod-1/node-{}/sys/fwstatuscont/running", node),
        "version": version
    }}})
}

pub fn fabric_node(id: &str, role: &str, state: &str, address: &str) -> Value {
    json!({"fabricNode": {"attributes": {
        "dn": format!("topology/pod-1/node-{}", id),
        "id": id,
        "name": format!("node-{}", id),
        "role": role,
        "fabricSt": state,
        "address": address
    }}})
}

pub fn cluster_node(id: &str, health: &str) -> Value {
    json!({"infraWiNode": {"attributes": {
        "id": id,
        "nodeName": format!("ctrl{}", id),
        "health": health
    }}})
}

/// Sessions that refuse connections to a configured set of hosts.
#[derive(Default)]
pub struct MockSessions {
    refused: HashSet<String>,
}

impl MockSessions {
    pub fn refusing(hosts: &[&str]) -> Self {
        MockSessions {
            refused: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl SessionFactory for MockSessions {
    fn open(&self, host: &str, _credentials: &Credentials) -> Box<dyn TerminalSession> {
        Box::new(MockSession {
            host: host.to_string(),
            refuse: self.refused.contains(host),
        })
    }
}

struct MockSession {
    host: String,
    refuse: bool,
}

impl TerminalSession for MockSession {
    fn connect(&mut self) -> Result<(), PlatformError> {
        if self.refuse {
            return Err(PlatformError::Session {
                host: self.host.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn login(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn run(&mut self, _command: &str, _timeout: Duration) -> Result<String, PlatformError> {
        Ok("Cisco Nexus Operating System (NX-OS) Software".to_string())
    }
}
