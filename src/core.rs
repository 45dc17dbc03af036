//! The Chord core (§4): neighbor tables, the join/start/stop lifecycle, and
//! the two key-location RPCs (`FindSuccessors`/`FindPredecessors`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;

use log::{debug, info, warn};

use crate::config::Config;
use crate::error::ChordError;
use crate::finger_table::FingerTable;
use crate::messages::{RelayMessage, RelayReply};
use crate::middleware::{Event, MiddlewareStore};
use crate::neighbor_list::NeighborList;
use crate::node::NodeInfo;
use crate::ring;
use crate::router::RelayRouter;
use crate::stabilization;
use crate::transport::{RemoteHandle, Transport};

/// The full set of neighbor tables backing one `Chord` instance. Grouped
/// into its own struct, behind an `Arc`, so the [`RelayRouter`] can hold a
/// reference independent of the rest of `Chord`'s lifecycle state.
pub struct ChordTables<H: RemoteHandle + Clone> {
    pub(crate) local_id: Vec<u8>,
    pub(crate) successors: NeighborList<H>,
    pub(crate) predecessors: NeighborList<H>,
    pub(crate) fingers: FingerTable<H>,
    /// The union of every live handle this node has ever accepted into any
    /// other table, unbounded. Exists so an embedder (or a future routing
    /// surface) has one place to look up "every neighbor", without it being
    /// a load-bearing part of key location itself.
    pub(crate) neighbors: NeighborList<H>,
}

impl<H: RemoteHandle + Clone> ChordTables<H> {
    fn new(local_id: Vec<u8>, config: &Config) -> Self {
        let m = config.node_id_bits;
        Self {
            successors: NeighborList::new(
                local_id.clone(),
                local_id.clone(),
                ring::prev_id(&local_id),
                false,
                config.min_num_successors,
            ),
            predecessors: NeighborList::new(
                local_id.clone(),
                ring::prev_id(&local_id),
                local_id.clone(),
                true,
                config.min_num_predecessors,
            ),
            fingers: FingerTable::new(&local_id, m, config.num_finger_successors),
            neighbors: NeighborList::new(
                local_id.clone(),
                local_id.clone(),
                ring::prev_id(&local_id),
                false,
                0,
            ),
            local_id,
        }
    }

    pub fn local_id(&self) -> &[u8] {
        &self.local_id
    }

    pub fn successors(&self) -> &NeighborList<H> {
        &self.successors
    }

    pub fn predecessors(&self) -> &NeighborList<H> {
        &self.predecessors
    }

    pub fn fingers(&self) -> &FingerTable<H> {
        &self.fingers
    }

    pub fn neighbors(&self) -> &NeighborList<H> {
        &self.neighbors
    }
}

/// The three lifecycle states a `Chord` instance passes through. There is
/// no way back from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    New,
    Started,
    Stopped,
}

pub(crate) struct Inner<T: Transport> {
    pub(crate) config: Config,
    pub(crate) tables: Arc<ChordTables<T::Handle>>,
    pub(crate) transport: Arc<T>,
    pub(crate) middleware: MiddlewareStore,
    pub(crate) router: RelayRouter<T::Handle>,
    started: AtomicBool,
    stopped: AtomicBool,
    joined: AtomicBool,
    stab_handles: Mutex<Vec<JoinHandle<()>>>,
}

/// The Chord core itself: a cheaply-`Clone`-able handle (an `Arc<Inner>`
/// underneath) so stabilization threads and transport callbacks can each
/// hold their own copy without the embedder managing lifetimes by hand.
pub struct Chord<T: Transport> {
    pub(crate) inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Chord<T> {
    fn clone(&self) -> Self {
        Chord {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A non-owning reference to a [`Chord`]. Middleware handlers that need to
/// call back into the core (to `Connect` a node the event told them about,
/// say) should close over one of these rather than a `Chord` clone. A
/// handler lives inside `Chord` via its `MiddlewareStore`, so closing over a
/// strong handle back to `Chord` would keep it alive forever.
pub struct WeakChord<T: Transport> {
    inner: Weak<Inner<T>>,
}

impl<T: Transport> Clone for WeakChord<T> {
    fn clone(&self) -> Self {
        WeakChord {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Transport> WeakChord<T> {
    pub fn upgrade(&self) -> Option<Chord<T>> {
        self.inner.upgrade().map(|inner| Chord { inner })
    }
}

impl<T: Transport> Chord<T> {
    /// Builds a fresh node identified by `local_id`, which must be exactly
    /// `config.id_bytes()` long.
    pub fn new(config: Config, local_id: Vec<u8>, transport: Arc<T>) -> Result<Self, ChordError> {
        if local_id.len() != config.id_bytes() {
            return Err(ChordError::InvalidIdentifier {
                expected: config.id_bytes(),
                actual: local_id.len(),
            });
        }

        let tables = Arc::new(ChordTables::new(local_id, &config));
        let router = RelayRouter::new(Arc::clone(&tables));

        Ok(Chord {
            inner: Arc::new(Inner {
                config,
                tables,
                transport,
                middleware: MiddlewareStore::new(),
                router,
                started: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                joined: AtomicBool::new(false),
                stab_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn local_id(&self) -> &[u8] {
        &self.inner.tables.local_id
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn tables(&self) -> &ChordTables<T::Handle> {
        &self.inner.tables
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn middleware(&self) -> &MiddlewareStore {
        &self.inner.middleware
    }

    /// A non-owning reference, safe to capture inside a registered
    /// middleware handler without keeping this instance alive forever.
    pub fn downgrade(&self) -> WeakChord<T> {
        WeakChord {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.inner.stopped.load(Ordering::Acquire) {
            Phase::Stopped
        } else if self.inner.started.load(Ordering::Acquire) {
            Phase::Started
        } else {
            Phase::New
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Begins connecting to a known member of the ring. The actual table
    /// insertion, and the one-shot join sequence it triggers, happen later
    /// and asynchronously through [`Self::on_remote_ready`] once the
    /// transport reports the connection live.
    pub fn join(&self, seed_addr: &str) -> Result<(), ChordError> {
        info!("joining ring via seed {seed_addr}");
        self.inner.transport.connect(seed_addr, None)
    }

    /// Enters the `Started` phase. Idempotent. Does not itself start the
    /// stabilization tasks. Those begin once the join hook fires (or
    /// immediately, for a node bootstrapping a new ring whose own tables
    /// already satisfy the join condition; see [`Self::on_remote_ready`]).
    pub fn start(&self) -> Result<(), ChordError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            debug!("chord core already started");
            return Ok(());
        }
        info!(
            "chord core started for node {}",
            hex::encode(&self.inner.tables.local_id)
        );
        Ok(())
    }

    /// Enters the `Stopped` phase and joins every stabilization thread.
    /// Idempotent. `cause`, when present, is logged but does not change the
    /// shutdown itself; there is no supervisor to report it to beyond the
    /// log.
    pub fn stop(&self, cause: Option<ChordError>) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            debug!("chord core already stopped");
            return;
        }
        match cause {
            Some(err) => warn!("chord core stopping due to error: {err}"),
            None => info!("chord core stopping"),
        }
        let mut handles = self.inner.stab_handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    /// Called by the embedder once a previously-`Connect`ed handle is live.
    /// Offers it to every table it might belong in; each acceptance fires
    /// the matching middleware event. The very first successful successor
    /// insertion arms the one-shot join sequence (§4.5).
    pub fn on_remote_ready(&self, handle: T::Handle) {
        let info = NodeInfo::new(handle.id().to_vec(), handle.addr().to_string());
        let tables = &self.inner.tables;

        if let Some(index) = tables.successors.add(handle.clone()) {
            self.inner.middleware.dispatch(&Event::SuccessorAdded {
                node: info.clone(),
                index,
            });
            self.arm_join_sequence();
        }

        if let Some(index) = tables.predecessors.add(handle.clone()) {
            self.inner.middleware.dispatch(&Event::PredecessorAdded {
                node: info.clone(),
                index,
            });
        }

        for (slot, list) in tables.fingers.iter().enumerate() {
            if let Some(index) = list.add(handle.clone()) {
                self.inner.middleware.dispatch(&Event::FingerTableAdded {
                    slot,
                    node: info.clone(),
                    index,
                });
            }
        }

        if tables.neighbors.add(handle).is_some() {
            self.inner
                .middleware
                .dispatch(&Event::NeighborAdded { node: info });
        }
    }

    /// Called by the embedder once a handle has dropped. Removes it from
    /// every table; `NeighborRemoved` is only emitted once, from the union
    /// table, regardless of how many per-table lists also dropped it.
    pub fn on_remote_disconnected(&self, handle: &T::Handle) {
        let tables = &self.inner.tables;
        tables.successors.remove(handle.id());
        tables.predecessors.remove(handle.id());
        for list in tables.fingers.iter() {
            list.remove(handle.id());
        }
        if tables.neighbors.remove(handle.id()) {
            let info = NodeInfo::new(handle.id().to_vec(), handle.addr().to_string());
            self.inner
                .middleware
                .dispatch(&Event::NeighborRemoved { node: info });
        }
    }

    /// Arms the join sequence exactly once, on the first `SuccessorAdded`
    /// event observed after `start()`. Runs off-thread so that the
    /// transport callback that triggered it is never blocked on the
    /// network round-trips the sequence performs.
    fn arm_join_sequence(&self) {
        if !self.inner.started.load(Ordering::Acquire) {
            return;
        }
        if self.inner.joined.swap(true, Ordering::SeqCst) {
            return;
        }
        let chord = self.clone();
        std::thread::spawn(move || chord.run_join_sequence());
    }

    fn run_join_sequence(&self) {
        info!("running join sequence");
        let target = ring::prev_id(&self.inner.tables.local_id);
        match self.find_successors(&target, self.inner.config.min_num_successors) {
            Ok(nodes) => {
                for node in nodes {
                    if node.id == self.inner.tables.local_id {
                        continue;
                    }
                    if let Err(err) = self.inner.transport.connect(&node.addr, Some(&node.id)) {
                        warn!("join: failed to connect to discovered node {node}: {err}");
                    }
                }
            }
            Err(err) => warn!("join: FindSuccessors failed: {err}"),
        }
        self.start_stabilization();
    }

    fn start_stabilization(&self) {
        info!("starting stabilization tasks");
        let mut handles = self.inner.stab_handles.lock().unwrap();
        handles.push(stabilization::spawn_update_successors(self.clone()));
        handles.push(stabilization::spawn_update_predecessors(self.clone()));
        handles.push(stabilization::spawn_find_new_predecessor(self.clone()));
        handles.push(stabilization::spawn_update_finger_table(self.clone()));
        handles.push(stabilization::spawn_find_new_finger(self.clone()));
    }

    /// Resolves the `n` successors of `key` (§4.3). Terminates locally when
    /// `key` equals this node's id or falls in `(localId, firstSuccessor]`;
    /// otherwise relays through the best next hop, retrying the remaining
    /// ranked candidates if a hop turns out to be unreachable.
    pub fn find_successors(&self, key: &[u8], n: usize) -> Result<Vec<NodeInfo>, ChordError> {
        let tables = &self.inner.tables;
        let first_successor = tables.successors.get_first();

        let locally_terminal = key == tables.local_id.as_slice()
            || first_successor
                .as_ref()
                .map(|s| ring::between_right_incl(&tables.local_id, s.id(), key))
                .unwrap_or(false);

        if locally_terminal {
            if first_successor.is_none() {
                return Err(ChordError::NoSuccessor);
            }
            let mut out = Vec::new();
            if key == tables.local_id.as_slice() {
                // The local node's own address is not this crate's concern.
                out.push(NodeInfo::new(tables.local_id.clone(), String::new()));
            }
            out.extend(tables.successors.to_node_list(true));
            out.truncate(n);
            return Ok(out);
        }

        self.relay_find(key, n, |num| RelayMessage::FindSuccessors { key: key.to_vec(), num_succ: num }, RelayReply::into_successors)
    }

    /// Resolves the `n` predecessors of `key` (§4.3). Terminates locally
    /// when `key` equals this node's id or falls strictly between
    /// `(localId, firstSuccessor)`, the open form, unlike `find_successors`'s
    /// half-open one.
    pub fn find_predecessors(&self, key: &[u8], n: usize) -> Result<Vec<NodeInfo>, ChordError> {
        let tables = &self.inner.tables;
        let first_successor = tables.successors.get_first();

        let locally_terminal = key == tables.local_id.as_slice()
            || first_successor
                .as_ref()
                .map(|s| ring::between(&tables.local_id, s.id(), key))
                .unwrap_or(false);

        if locally_terminal {
            if first_successor.is_none() {
                return Err(ChordError::NoSuccessor);
            }
            let mut out = vec![NodeInfo::new(tables.local_id.clone(), String::new())];
            out.extend(tables.predecessors.to_node_list(true));
            out.truncate(n);
            return Ok(out);
        }

        self.relay_find(key, n, |num| RelayMessage::FindPredecessors { key: key.to_vec(), num_pred: num }, RelayReply::into_predecessors)
    }

    /// Shared retry loop for the two `Find*` RPCs: walk the router's ranked
    /// candidate list, trying each as the relay target until one answers or
    /// the candidates are exhausted (§4.4 step 4).
    fn relay_find(
        &self,
        key: &[u8],
        n: usize,
        build_msg: impl Fn(u32) -> RelayMessage,
        decode: impl Fn(RelayReply) -> Result<Vec<NodeInfo>, ChordError>,
    ) -> Result<Vec<NodeInfo>, ChordError> {
        let candidates = self.inner.router.ranked_candidates(key);
        if candidates.is_empty() {
            return Err(ChordError::NoSuccessor);
        }

        let mut last_err = None;
        for hop in candidates {
            let msg = build_msg(n as u32);
            match self.inner.transport.send_message_sync(&hop, msg) {
                Ok(reply) => {
                    let mut nodes = decode(reply)?;
                    nodes.truncate(n);
                    return Ok(nodes);
                }
                Err(err) => {
                    warn!("relay to {hop_addr} failed, trying next candidate: {err}", hop_addr = hop.addr());
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(ChordError::NoSuccessor))
    }

    /// Answers `GetSuccAndPred` directly from this node's own tables.
    pub fn get_succ_and_pred(&self, num_succ: usize, num_pred: usize) -> RelayReply {
        let tables = &self.inner.tables;
        let mut successors = tables.successors.to_node_list(true);
        successors.truncate(num_succ);
        let mut predecessors = tables.predecessors.to_node_list(true);
        predecessors.truncate(num_pred);
        RelayReply::GetSuccAndPred {
            successors,
            predecessors,
        }
    }

    /// The single entry point an embedder calls once its own envelope
    /// routing (`Direct`/`Relay`/`Broadcast`, out of this crate's scope)
    /// has decided a `RelayMessage` is addressed to this node.
    pub fn handle_relay(&self, msg: RelayMessage) -> Result<RelayReply, ChordError> {
        match msg {
            RelayMessage::GetSuccAndPred { num_succ, num_pred } => {
                Ok(self.get_succ_and_pred(num_succ as usize, num_pred as usize))
            }
            RelayMessage::FindSuccessors { key, num_succ } => self
                .find_successors(&key, num_succ as usize)
                .map(|successors| RelayReply::FindSuccessors { successors }),
            RelayMessage::FindPredecessors { key, num_pred } => self
                .find_predecessors(&key, num_pred as usize)
                .map(|predecessors| RelayReply::FindPredecessors { predecessors }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Clone)]
    struct NullHandle {
        id: Vec<u8>,
        addr: String,
    }

    impl RemoteHandle for NullHandle {
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

    /// Never actually reaches the network; these tests only exercise table
    /// insertion and the middleware wiring around it, with stabilization
    /// left unstarted.
    struct NullTransport;

    impl Transport for NullTransport {
        type Handle = NullHandle;

        fn connect(&self, _addr: &str, _id: Option<&[u8]>) -> Result<(), ChordError> {
            Ok(())
        }

        fn send_message_sync(&self, _handle: &NullHandle, _msg: RelayMessage) -> Result<RelayReply, ChordError> {
            Err(ChordError::transport("NullTransport never answers"))
        }
    }

    fn test_config() -> Config {
        Config {
            node_id_bits: 8,
            min_num_successors: 3,
            min_num_predecessors: 3,
            num_finger_successors: 1,
            base_stabilize_interval: Duration::from_secs(3600),
        }
    }

    #[test]
    fn rejects_identifier_of_the_wrong_length() {
        let transport = Arc::new(NullTransport);
        let err = Chord::new(test_config(), vec![0x01, 0x02], transport).unwrap_err();
        assert!(matches!(
            err,
            ChordError::InvalidIdentifier {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn successor_added_events_carry_ascending_insertion_indices() {
        let transport = Arc::new(NullTransport);
        let chord = Chord::new(test_config(), vec![0x40], transport).unwrap();

        let indices = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&indices);
        chord.middleware().register(Box::new(move |event| {
            if let Event::SuccessorAdded { index, .. } = event {
                captured.lock().unwrap().push(*index);
            }
            true
        }));

        // All three land in the successor list at distinct distances from
        // 0x40, so each is a genuine new-farthest insertion.
        chord.on_remote_ready(NullHandle {
            id: vec![0x50],
            addr: "p50".into(),
        });
        chord.on_remote_ready(NullHandle {
            id: vec![0x60],
            addr: "p60".into(),
        });
        chord.on_remote_ready(NullHandle {
            id: vec![0x70],
            addr: "p70".into(),
        });

        assert_eq!(*indices.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn join_sequence_runs_at_most_once_per_lifetime() {
        // A short base interval so the stabilization threads the join
        // sequence starts don't keep `stop()` waiting on a long sleep.
        let mut config = test_config();
        config.base_stabilize_interval = Duration::from_millis(5);

        let transport = Arc::new(NullTransport);
        let chord = Chord::new(config, vec![0x40], transport).unwrap();
        chord.start().unwrap();

        // `joined` flips synchronously, on the calling thread, the moment
        // the first successor is accepted, before the join sequence
        // itself (which runs off-thread) does any work.
        assert!(!chord.inner.joined.load(Ordering::SeqCst));
        chord.on_remote_ready(NullHandle {
            id: vec![0x50],
            addr: "p50".into(),
        });
        assert!(chord.inner.joined.load(Ordering::SeqCst));

        chord.on_remote_ready(NullHandle {
            id: vec![0x60],
            addr: "p60".into(),
        });
        // Still true, and `arm_join_sequence` is only ever entered through
        // the swap-to-true path once: a second add finds `joined` already
        // set and returns immediately rather than spawning another run.
        assert!(chord.inner.joined.load(Ordering::SeqCst));

        chord.stop(None);
    }

    #[test]
    fn disconnect_removes_from_every_table_and_emits_neighbor_removed_once() {
        let transport = Arc::new(NullTransport);
        let chord = Chord::new(test_config(), vec![0x40], transport).unwrap();

        let removals = Arc::new(AtomicUsize::new(0));
        let captured = Arc::clone(&removals);
        chord.middleware().register(Box::new(move |event| {
            if matches!(event, Event::NeighborRemoved { .. }) {
                captured.fetch_add(1, Ordering::SeqCst);
            }
            true
        }));

        let handle = NullHandle {
            id: vec![0x50],
            addr: "p50".into(),
        };
        chord.on_remote_ready(handle.clone());
        assert!(chord.tables().successors().exists(&[0x50]));
        assert!(chord.tables().neighbors().exists(&[0x50]));

        chord.on_remote_disconnected(&handle);

        assert!(!chord.tables().successors().exists(&[0x50]));
        assert!(!chord.tables().predecessors().exists(&[0x50]));
        assert!(!chord.tables().neighbors().exists(&[0x50]));
        assert_eq!(removals.load(Ordering::SeqCst), 1);
    }
}
