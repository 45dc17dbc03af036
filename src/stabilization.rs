//! The five periodic maintenance tasks (§4.5): `update-succ`, `update-pred`,
//! `find-new-pred`, `update-finger`, `find-new-finger`. Spawned once, after
//! the join sequence completes, and run until [`Chord::stop`] is called.
//!
//! None of these mutate a [`NeighborList`] directly. They only ever call
//! `Transport::connect` on a discovered candidate and let the transport's
//! eventual `on_remote_ready` callback perform the actual insertion. This
//! keeps every table mutation flowing through the one path that also fires
//! middleware events.

use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::core::Chord;
use crate::neighbor_list::NeighborList;
use crate::transport::{RemoteHandle, Transport};

/// Uniform jitter in `[0.5 * base, 1.5 * base]`, re-sampled every tick so
/// stabilization traffic across a ring doesn't stay in lock-step.
fn jittered(base: Duration) -> Duration {
    let lo = base.as_secs_f64() * 0.5;
    let hi = base.as_secs_f64() * 1.5;
    let secs = rand::rng().random_range(lo..=hi);
    Duration::from_secs_f64(secs.max(0.0))
}

/// Tasks tied to predecessor discovery run three times less often than the
/// rest.
fn jittered_slow(base: Duration) -> Duration {
    jittered(base * 3)
}

fn spawn_loop<T, F>(chord: Chord<T>, interval: impl Fn(Duration) -> Duration + Send + 'static, mut tick: F) -> JoinHandle<()>
where
    T: Transport,
    F: FnMut(&Chord<T>) + Send + 'static,
{
    thread::spawn(move || {
        let base = chord.config().base_stabilize_interval;
        while !chord.is_stopped() {
            tick(&chord);
            thread::sleep(interval(base));
        }
    })
}

/// `update-succ`: periodically asks the first live successor for its own
/// successors and predecessors, connecting to any that belong in our
/// successor list and aren't already there.
pub fn spawn_update_successors<T: Transport>(chord: Chord<T>) -> JoinHandle<()> {
    spawn_loop(chord, jittered, |chord| {
        update_neighbor_list(chord, chord.tables().successors());
    })
}

/// `update-pred`: the same refresh, run against the predecessor list, at
/// the slower cadence.
pub fn spawn_update_predecessors<T: Transport>(chord: Chord<T>) -> JoinHandle<()> {
    spawn_loop(chord, jittered_slow, |chord| {
        update_neighbor_list(chord, chord.tables().predecessors());
    })
}

/// `find-new-pred`: asks for one predecessor of the predecessor list's
/// `startID`, connecting to it only if it's closer than our current best.
pub fn spawn_find_new_predecessor<T: Transport>(chord: Chord<T>) -> JoinHandle<()> {
    spawn_loop(chord, jittered_slow, find_new_predecessor)
}

/// `update-finger`: walks the finger table, running the generic neighbor
/// refresh on each non-empty slot with a jittered pause between slots. If
/// every slot is empty this tick, it still sleeps once rather than busy
/// looping.
pub fn spawn_update_finger_table<T: Transport>(chord: Chord<T>) -> JoinHandle<()> {
    thread::spawn(move || {
        let base = chord.config().base_stabilize_interval;
        while !chord.is_stopped() {
            let mut touched_any = false;
            for slot in chord.tables().fingers().iter() {
                if chord.is_stopped() {
                    return;
                }
                if slot.is_empty() {
                    continue;
                }
                update_neighbor_list(&chord, slot);
                touched_any = true;
                thread::sleep(jittered(base));
            }
            if !touched_any {
                thread::sleep(jittered(base));
            }
        }
    })
}

/// `find-new-finger`: scans the finger table looking for slots with no
/// entry yet, probing one successor per gap. A single probe can satisfy
/// several consecutive empty slots at once, so the scan advances past
/// whichever slot the probe actually filled rather than stepping one at a
/// time.
pub fn spawn_find_new_finger<T: Transport>(chord: Chord<T>) -> JoinHandle<()> {
    spawn_loop(chord, jittered, find_new_finger)
}

fn update_neighbor_list<T: Transport>(chord: &Chord<T>, list: &NeighborList<T::Handle>) {
    let Some(first) = list.get_first() else {
        return;
    };
    let cap = list.cap() as u32;
    let msg = crate::messages::RelayMessage::GetSuccAndPred {
        num_succ: cap,
        num_pred: cap,
    };
    match chord.transport().send_message_sync(&first, msg) {
        Ok(reply) => match reply.into_succ_and_pred() {
            Ok((successors, predecessors)) => {
                for candidate in successors.iter().chain(predecessors.iter()) {
                    connect_if_new(chord, list, candidate);
                }
            }
            Err(err) => warn!("stabilization: malformed GetSuccAndPred reply: {err}"),
        },
        Err(err) => warn!(
            "stabilization: GetSuccAndPred to {addr} failed: {err}",
            addr = first.addr()
        ),
    }
}

fn connect_if_new<T: Transport>(
    chord: &Chord<T>,
    list: &NeighborList<T::Handle>,
    candidate: &crate::node::NodeInfo,
) {
    if candidate.id == chord.local_id() {
        return;
    }
    if !list.is_id_in_range(&candidate.id) || list.exists(&candidate.id) {
        return;
    }
    if let Err(err) = chord.transport().connect(&candidate.addr, Some(&candidate.id)) {
        warn!("stabilization: connect to {candidate} failed: {err}");
    }
}

fn find_new_predecessor<T: Transport>(chord: &Chord<T>) {
    let predecessors = chord.tables().predecessors();
    let start = predecessors.start_id();
    let candidate = match chord.find_predecessors(&start, 1) {
        Ok(nodes) => nodes.into_iter().next(),
        Err(err) => {
            warn!("stabilization: find-new-predecessor lookup failed: {err}");
            return;
        }
    };
    let Some(candidate) = candidate else { return };
    if candidate.id == chord.local_id() {
        return;
    }
    if !predecessors.is_id_in_range(&candidate.id) || predecessors.exists(&candidate.id) {
        return;
    }
    let closer = match predecessors.get_first() {
        Some(current) => predecessors.closer(&candidate.id, current.id()),
        None => true,
    };
    if closer {
        if let Err(err) = chord.transport().connect(&candidate.addr, Some(&candidate.id)) {
            warn!("stabilization: connect to {candidate} failed: {err}");
        }
    }
}

fn find_new_finger<T: Transport>(chord: &Chord<T>) {
    let fingers = chord.tables().fingers();
    let m = fingers.len();
    let mut i = 0usize;

    while i < m {
        if chord.is_stopped() {
            return;
        }

        let start = fingers.slot(i).start_id();
        let candidate = match chord.find_successors(&start, 1) {
            Ok(nodes) => nodes.into_iter().next(),
            Err(err) => {
                warn!("stabilization: find-new-finger lookup failed: {err}");
                i += 1;
                continue;
            }
        };

        let Some(candidate) = candidate else {
            i += 1;
            continue;
        };
        if candidate.id == chord.local_id() {
            i += 1;
            continue;
        }

        // The probe answers for slot `i`'s startID, but the candidate it
        // returns may actually belong to a later slot; advance to whichever
        // slot it fits so one probe can fill a run of empty slots.
        let mut j = i;
        while j < m && !fingers.slot(j).is_id_in_range(&candidate.id) {
            j += 1;
        }
        if j >= m {
            i += 1;
            continue;
        }

        let slot = fingers.slot(j);
        if !slot.exists(&candidate.id) {
            let closer = match slot.get_first() {
                Some(current) => slot.closer(&candidate.id, current.id()),
                None => true,
            };
            if closer {
                if let Err(err) = chord.transport().connect(&candidate.addr, Some(&candidate.id)) {
                    warn!("stabilization: connect to {candidate} failed: {err}");
                }
            }
        }
        i = j + 1;
    }
}
