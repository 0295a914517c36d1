// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! In-memory stand-ins for the node client, client factory and decrypter.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::client::{ClientFactory, NodeClient};
use crate::decrypt::Decrypter;
use crate::errors::FleetError;
use crate::models::{
    Datacenter, Host, Key, LeaderInfo, RekeyInitRequest, RekeySession, RekeyUpdate, SealStatus,
    ShareKey,
};

const MUTATING_CALLS: [&str; 3] = ["unseal", "rekey-init", "rekey-update"];

#[derive(Default)]
struct NodeState {
    initialized: bool,
    sealed: bool,
    threshold: u32,
    progress: u32,
    is_self: bool,
    fail_init: bool,
    fail_seal: bool,
    fail_leader: bool,
    fail_unseal_once: bool,
    fail_rekey_update_once: bool,
    rekey: Option<RekeySession>,
    rotated_keys: Vec<String>,
    fingerprints: Vec<String>,
    calls: Vec<&'static str>,
    unseal_keys: Vec<String>,
    rekey_init_requests: Vec<RekeyInitRequest>,
    rekey_updates: Vec<(String, String)>,
}

pub struct FakeNode {
    address: String,
    state: Mutex<NodeState>,
    barrier: Option<Arc<Barrier>>,
}

impl FakeNode {
    fn with_state(state: NodeState) -> Self {
        Self {
            address: "fake://node".to_string(),
            state: Mutex::new(state),
            barrier: None,
        }
    }

    pub fn sealed(threshold: u32) -> Self {
        Self::with_state(NodeState {
            initialized: true,
            sealed: true,
            threshold,
            ..Default::default()
        })
    }

    pub fn uninitialized() -> Self {
        Self::with_state(NodeState {
            sealed: true,
            ..Default::default()
        })
    }

    pub fn unsealed_leader() -> Self {
        Self::with_state(NodeState {
            initialized: true,
            threshold: 1,
            is_self: true,
            ..Default::default()
        })
    }

    pub fn unsealed_follower() -> Self {
        Self::with_state(NodeState {
            initialized: true,
            threshold: 1,
            ..Default::default()
        })
    }

    pub fn with_rekey_session(self, required: u32) -> Self {
        self.lock().rekey = Some(RekeySession {
            started: true,
            shares: 5,
            threshold: 3,
            nonce: "nonce-1".to_string(),
            progress: 0,
            required,
        });
        self
    }

    pub fn with_rotated_keys(self, keys: &[&str], fingerprints: &[&str]) -> Self {
        {
            let mut state = self.lock();
            state.rotated_keys = keys.iter().map(|key| key.to_string()).collect();
            state.fingerprints = fingerprints.iter().map(|fp| fp.to_string()).collect();
        }
        self
    }

    /// Every seal-status read waits until all nodes sharing `barrier` got there.
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn fail_init_status(&self) {
        self.lock().fail_init = true;
    }

    pub fn fail_seal_status(&self) {
        self.lock().fail_seal = true;
    }

    pub fn fail_leader(&self) {
        self.lock().fail_leader = true;
    }

    pub fn fail_unseal_once(&self) {
        self.lock().fail_unseal_once = true;
    }

    pub fn fail_rekey_update_once(&self) {
        self.lock().fail_rekey_update_once = true;
    }

    pub fn calls(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|call| **call == name).count()
    }

    pub fn mutating_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| MUTATING_CALLS.contains(*call))
            .count()
    }

    pub fn unseal_keys(&self) -> Vec<String> {
        self.lock().unseal_keys.clone()
    }

    pub fn rekey_init_requests(&self) -> Vec<RekeyInitRequest> {
        self.lock().rekey_init_requests.clone()
    }

    pub fn rekey_update_keys(&self) -> Vec<String> {
        self.lock()
            .rekey_updates
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn rekey_update_nonces(&self) -> Vec<String> {
        self.lock()
            .rekey_updates
            .iter()
            .map(|(_, nonce)| nonce.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: &'static str) -> std::sync::MutexGuard<'_, NodeState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl NodeClient for FakeNode {
    fn address(&self) -> &str {
        &self.address
    }

    async fn init_status(&self) -> Result<bool, FleetError> {
        let state = self.record("init-status");
        if state.fail_init {
            return Err(FleetError::remote("init-status", "connection refused"));
        }
        Ok(state.initialized)
    }

    async fn seal_status(&self) -> Result<SealStatus, FleetError> {
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        let state = self.record("seal-status");
        if state.fail_seal {
            return Err(FleetError::remote("seal-status", "connection refused"));
        }
        Ok(SealStatus {
            sealed: state.sealed,
            initialized: state.initialized,
            threshold: state.threshold,
            shares: 5,
            progress: state.progress,
        })
    }

    async fn leader(&self) -> Result<LeaderInfo, FleetError> {
        let state = self.record("leader");
        if state.fail_leader {
            return Err(FleetError::remote("leader", "connection refused"));
        }
        Ok(LeaderInfo {
            is_self: state.is_self,
            ha_enabled: true,
            leader_address: "https://leader:8200".to_string(),
        })
    }

    async fn unseal(&self, key: &ShareKey) -> Result<SealStatus, FleetError> {
        let mut state = self.record("unseal");
        state.unseal_keys.push(key.expose().to_string());
        if state.fail_unseal_once {
            state.fail_unseal_once = false;
            return Err(FleetError::remote("unseal", "invalid key"));
        }
        state.progress += 1;
        if state.progress >= state.threshold {
            state.sealed = false;
            state.progress = 0;
        }
        Ok(SealStatus {
            sealed: state.sealed,
            initialized: state.initialized,
            threshold: state.threshold,
            shares: 5,
            progress: state.progress,
        })
    }

    async fn rekey_init(&self, request: RekeyInitRequest) -> Result<RekeySession, FleetError> {
        let mut state = self.record("rekey-init");
        state.rekey_init_requests.push(request);
        let session = RekeySession {
            started: true,
            shares: request.shares,
            threshold: request.threshold,
            nonce: "nonce-1".to_string(),
            progress: 0,
            required: state.threshold,
        };
        state.rekey = Some(session.clone());
        Ok(session)
    }

    async fn rekey_status(&self) -> Result<RekeySession, FleetError> {
        let state = self.record("rekey-status");
        Ok(state.rekey.clone().unwrap_or_default())
    }

    async fn rekey_update(&self, key: &ShareKey, nonce: &str) -> Result<RekeyUpdate, FleetError> {
        let mut state = self.record("rekey-update");
        state
            .rekey_updates
            .push((key.expose().to_string(), nonce.to_string()));
        if state.fail_rekey_update_once {
            state.fail_rekey_update_once = false;
            return Err(FleetError::remote("rekey-update", "invalid key"));
        }

        let Some(mut session) = state.rekey.take() else {
            return Err(FleetError::remote("rekey-update", "no rekey in progress"));
        };
        if session.nonce != nonce {
            state.rekey = Some(session);
            return Err(FleetError::remote("rekey-update", "incorrect nonce"));
        }

        session.progress += 1;
        if session.progress >= session.required {
            return Ok(RekeyUpdate {
                complete: true,
                nonce: session.nonce,
                keys: state.rotated_keys.clone(),
                pgp_fingerprints: state.fingerprints.clone(),
                ..Default::default()
            });
        }

        let update = RekeyUpdate {
            complete: false,
            nonce: session.nonce.clone(),
            progress: session.progress,
            required: session.required,
            ..Default::default()
        };
        state.rekey = Some(session);
        Ok(update)
    }
}

struct SharedNode(Arc<FakeNode>);

#[async_trait]
impl NodeClient for SharedNode {
    fn address(&self) -> &str {
        self.0.address()
    }

    async fn init_status(&self) -> Result<bool, FleetError> {
        self.0.init_status().await
    }

    async fn seal_status(&self) -> Result<SealStatus, FleetError> {
        self.0.seal_status().await
    }

    async fn leader(&self) -> Result<LeaderInfo, FleetError> {
        self.0.leader().await
    }

    async fn unseal(&self, key: &ShareKey) -> Result<SealStatus, FleetError> {
        self.0.unseal(key).await
    }

    async fn rekey_init(&self, request: RekeyInitRequest) -> Result<RekeySession, FleetError> {
        self.0.rekey_init(request).await
    }

    async fn rekey_status(&self) -> Result<RekeySession, FleetError> {
        self.0.rekey_status().await
    }

    async fn rekey_update(&self, key: &ShareKey, nonce: &str) -> Result<RekeyUpdate, FleetError> {
        self.0.rekey_update(key, nonce).await
    }
}

/// Hands out registered [`FakeNode`]s by host name and records every connect.
#[derive(Default)]
pub struct FakeFactory {
    nodes: HashMap<String, Arc<FakeNode>>,
    unreachable: HashSet<String>,
    connects: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn with_node(mut self, host: &str, node: FakeNode) -> Self {
        self.nodes.insert(host.to_string(), Arc::new(node));
        self
    }

    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn node(&self, host: &str) -> Arc<FakeNode> {
        self.nodes[host].clone()
    }

    pub fn connects(&self) -> Vec<String> {
        let mut connects = self.connects.lock().unwrap().clone();
        connects.sort();
        connects
    }
}

impl ClientFactory for FakeFactory {
    fn connect(&self, host: &Host) -> Result<Box<dyn NodeClient>, FleetError> {
        self.connects.lock().unwrap().push(host.name.clone());
        if self.unreachable.contains(&host.name) {
            return Err(FleetError::connection(&host.name, host.port, "unreachable"));
        }
        match self.nodes.get(&host.name) {
            Some(node) => Ok(Box::new(SharedNode(node.clone()))),
            None => Err(FleetError::connection(&host.name, host.port, "unknown host")),
        }
    }
}

/// Decrypts `c` to `plain:c`, and fails on the ciphertext `bad`.
#[derive(Default)]
pub struct FakeDecrypter {
    calls: Mutex<usize>,
}

impl FakeDecrypter {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Decrypter for FakeDecrypter {
    async fn decrypt(&self, ciphertext: &str) -> Result<ShareKey, FleetError> {
        *self.calls.lock().unwrap() += 1;
        if ciphertext == "bad" {
            return Err(FleetError::DecryptError("bad ciphertext".to_string()));
        }
        Ok(ShareKey::new(format!("plain:{ciphertext}")))
    }
}

pub fn datacenter(name: &str, hosts: &[&str], keys: &[&str]) -> Datacenter {
    Datacenter {
        name: name.to_string(),
        hosts: hosts.iter().map(|host| Host::new(*host, 8200)).collect(),
        keys: keys
            .iter()
            .map(|key| Key {
                key: key.to_string(),
            })
            .collect(),
    }
}
