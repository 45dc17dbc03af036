//! An in-process mock transport, shared by every integration test in this
//! directory. Connections are resolved against a shared [`Network`] registry
//! instead of real sockets, but `Connect`'s asynchronous-completion contract
//! and `SendMessageSync`'s synchronous one are both honored, so tests
//! exercise the real stabilization threads end to end.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once, OnceLock};
use std::time::{Duration, Instant};

use chord_core::{Chord, ChordError, Config, NodeInfo, RelayMessage, RelayReply, RemoteHandle, Transport, WeakChord};

static LOG_INIT: Once = Once::new();

/// Initializes `env_logger` once per test binary, so `RUST_LOG=debug cargo
/// test -- --nocapture` surfaces the stabilization/relay `log` output these
/// tests otherwise run blind.
fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Clone)]
pub struct MockHandle {
    id: Vec<u8>,
    addr: String,
}

impl MockHandle {
    fn new(id: Vec<u8>, addr: String) -> Self {
        Self { id, addr }
    }
}

impl RemoteHandle for MockHandle {
    fn id(&self) -> &[u8] {
        &self.id
    }
    fn addr(&self) -> &str {
        &self.addr
    }
    fn is_connected(&self) -> bool {
        true
    }
}

/// The shared address book every [`MockTransport`] in a test resolves
/// `Connect`/`SendMessageSync` calls against.
#[derive(Default)]
pub struct Network {
    nodes: Mutex<HashMap<String, Chord<MockTransport>>>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn register(&self, addr: String, chord: Chord<MockTransport>) {
        self.nodes.lock().unwrap().insert(addr, chord);
    }

    /// `None` both when nothing was ever registered at `addr` and when the
    /// node registered there has since `stop()`ped, simulating a crashed
    /// peer without modeling real socket teardown.
    fn lookup(&self, addr: &str) -> Option<Chord<MockTransport>> {
        self.nodes
            .lock()
            .unwrap()
            .get(addr)
            .filter(|chord| !chord.is_stopped())
            .cloned()
    }
}

pub struct MockTransport {
    addr: String,
    local_id: Vec<u8>,
    network: Arc<Network>,
    // A weak handle back to this transport's own `Chord`, so `Connect` can
    // deliver the symmetric `on_remote_ready` callback a real bidirectional
    // transport would. Weak so this isn't a reference cycle: `Chord` already
    // owns an `Arc<MockTransport>`.
    self_chord: OnceLock<WeakChord<MockTransport>>,
}

impl MockTransport {
    fn new(addr: String, local_id: Vec<u8>, network: Arc<Network>) -> Self {
        Self {
            addr,
            local_id,
            network,
            self_chord: OnceLock::new(),
        }
    }

    fn bind(&self, chord: &Chord<MockTransport>) {
        let _ = self.self_chord.set(chord.downgrade());
    }
}

impl Transport for MockTransport {
    type Handle = MockHandle;

    fn connect(&self, addr: &str, id: Option<&[u8]>) -> Result<(), ChordError> {
        let target = self
            .network
            .lookup(addr)
            .ok_or_else(|| ChordError::transport(format!("no node registered at {addr}")))?;

        if let Some(expected) = id {
            if target.local_id() != expected {
                return Err(ChordError::transport("peer id mismatch on connect"));
            }
        }

        let target_handle = MockHandle::new(target.local_id().to_vec(), addr.to_string());
        let local_handle = MockHandle::new(self.local_id.clone(), self.addr.clone());

        if let Some(chord) = self.self_chord.get().and_then(WeakChord::upgrade) {
            chord.on_remote_ready(target_handle);
        }
        target.on_remote_ready(local_handle);

        Ok(())
    }

    fn send_message_sync(&self, handle: &MockHandle, msg: RelayMessage) -> Result<RelayReply, ChordError> {
        match self.network.lookup(handle.addr()) {
            Some(target) => target.handle_relay(msg),
            None => {
                // A real transport would have already reported this via its
                // disconnect callback; the mock fires it here instead, on
                // first discovering the peer is gone.
                if let Some(chord) = self.self_chord.get().and_then(WeakChord::upgrade) {
                    chord.on_remote_disconnected(handle);
                }
                Err(ChordError::transport(format!(
                    "peer {} unreachable",
                    handle.addr()
                )))
            }
        }
    }
}

/// Builds a `Chord` wired to a fresh `MockTransport`, registers it in
/// `network` under `addr`, and starts it.
pub fn spawn_node(network: &Arc<Network>, config: Config, id: Vec<u8>, addr: &str) -> Chord<MockTransport> {
    init_logging();
    let transport = Arc::new(MockTransport::new(addr.to_string(), id.clone(), Arc::clone(network)));
    let chord = Chord::new(config, id, Arc::clone(&transport)).expect("id length matches config");
    transport.bind(&chord);
    network.register(addr.to_string(), chord.clone());
    chord.start().expect("start is infallible here");
    chord
}

/// A small config tuned for fast convergence in tests: an 8-bit ring and a
/// short base stabilization interval.
pub fn fast_config() -> Config {
    Config {
        node_id_bits: 8,
        min_num_successors: 3,
        min_num_predecessors: 3,
        num_finger_successors: 1,
        base_stabilize_interval: Duration::from_millis(15),
    }
}

/// Polls `predicate` until it returns `true` or `timeout` elapses, returning
/// whether it converged. Stabilization runs on jittered real-time threads,
/// so tests wait for a condition instead of assuming a single fixed sleep
/// covers it.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

pub fn node_ids(nodes: &[NodeInfo]) -> Vec<Vec<u8>> {
    nodes.iter().map(|n| n.id.clone()).collect()
}
