use std::collections::{HashMap, HashSet, VecDeque};

use log::{trace, warn};
use parking_lot::Mutex;

use crate::common::types::{LockMode, PageId, TransactionId};

/// One granted page lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lock {
    tid: TransactionId,
    mode: LockMode,
}

#[derive(Debug, Default)]
struct LockState {
    /// Per-page holders. Entries are created lazily and pruned when the
    /// last lock on a page is released.
    page_locks: HashMap<PageId, Vec<Lock>>,

    /// Wait-for graph: a blocked transaction maps to the set of
    /// transactions holding the locks that refused it. Edges for a
    /// transaction are dropped as soon as it is granted any lock.
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

/// Per-page lock table with deadlock detection over a transaction
/// wait-for graph.
///
/// `acquire` is a single non-blocking attempt; waiting happens in the
/// caller, outside this manager's mutex. All state lives behind one mutex
/// held only for the duration of one call, never across a sleep.
pub struct LockManager {
    state: Mutex<LockState>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::default()),
        }
    }

    /// Try to acquire a lock for `tid` on `pid` in `mode`. Returns whether
    /// the lock was granted; a refusal records wait-for edges from `tid` to
    /// every conflicting holder and leaves retry policy to the caller.
    ///
    /// A transaction holds at most one lock per page: a Shared lock is
    /// upgraded in place to Exclusive when `tid` is the sole holder.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let state = &mut *self.state.lock();

        let mut held: Option<LockMode> = None;
        let mut blockers: Vec<TransactionId> = Vec::new();
        for lock in state.page_locks.get(&pid).map(Vec::as_slice).unwrap_or(&[]) {
            if lock.tid == tid {
                held = Some(lock.mode);
            } else if lock.mode == LockMode::Exclusive || mode == LockMode::Exclusive {
                blockers.push(lock.tid);
            }
        }

        let granted = match (held, mode) {
            // Held mode already covers the request.
            (Some(LockMode::Exclusive), _) | (Some(LockMode::Shared), LockMode::Shared) => true,
            // Upgrade in place, but only as the sole holder.
            (Some(LockMode::Shared), LockMode::Exclusive) => {
                if blockers.is_empty() {
                    let locks = state
                        .page_locks
                        .get_mut(&pid)
                        .expect("held lock implies a lock-table entry");
                    let own = locks
                        .iter_mut()
                        .find(|l| l.tid == tid)
                        .expect("held lock implies an entry for tid");
                    own.mode = LockMode::Exclusive;
                    true
                } else {
                    false
                }
            }
            (None, _) => {
                if blockers.is_empty() {
                    state.page_locks.entry(pid).or_default().push(Lock { tid, mode });
                    true
                } else {
                    false
                }
            }
        };

        if granted {
            // The transaction is no longer waiting on anyone.
            state.wait_for.remove(&tid);
            trace!("{tid} granted {mode:?} on {pid}");
        } else {
            let edges = state.wait_for.entry(tid).or_default();
            for holder in blockers {
                edges.insert(holder);
            }
            trace!("{tid} refused {mode:?} on {pid}");
        }
        granted
    }

    /// Release any lock `tid` holds on `pid`. No-op if none is held.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut state = self.state.lock();
        if let Some(locks) = state.page_locks.get_mut(&pid) {
            locks.retain(|l| l.tid != tid);
            if locks.is_empty() {
                state.page_locks.remove(&pid);
            }
        }
    }

    /// Release every lock held by `tid` and drop it from the wait-for
    /// graph. Used at transaction end (commit or abort).
    pub fn release_all(&self, tid: TransactionId) {
        let mut state = self.state.lock();
        state.page_locks.retain(|_, locks| {
            locks.retain(|l| l.tid != tid);
            !locks.is_empty()
        });
        state.wait_for.remove(&tid);
        for edges in state.wait_for.values_mut() {
            edges.remove(&tid);
        }
        state.wait_for.retain(|_, edges| !edges.is_empty());
        trace!("{tid} released all locks");
    }

    /// Whether `tid` currently holds any lock on `pid`.
    pub fn holds(&self, tid: TransactionId, pid: PageId) -> bool {
        self.held_mode(tid, pid).is_some()
    }

    /// The mode `tid` holds on `pid`, if any.
    pub fn held_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        let state = self.state.lock();
        state
            .page_locks
            .get(&pid)
            .and_then(|locks| locks.iter().find(|l| l.tid == tid))
            .map(|l| l.mode)
    }

    /// Whether `tid`'s wait chain contains a cycle, i.e. the transaction is
    /// deadlocked (directly or transitively).
    pub fn has_cycle(&self, tid: TransactionId) -> bool {
        self.deadlock_victim(tid).is_some()
    }

    /// Deadlock check with deterministic victim selection.
    ///
    /// Computes the subgraph of the wait-for graph reachable from `tid`,
    /// then strips zero-in-degree nodes Kahn-style; any residue means a
    /// cycle. The victim is the youngest (highest-ID) transaction that is
    /// actually on a cycle — never one merely blocked behind it — so every
    /// participant polling this method agrees on who aborts and the rest
    /// keep waiting.
    pub fn deadlock_victim(&self, tid: TransactionId) -> Option<TransactionId> {
        let state = self.state.lock();

        // Reachable subgraph.
        let mut reachable: HashSet<TransactionId> = HashSet::new();
        let mut queue: VecDeque<TransactionId> = VecDeque::from([tid]);
        while let Some(t) = queue.pop_front() {
            if !reachable.insert(t) {
                continue;
            }
            if let Some(next) = state.wait_for.get(&t) {
                queue.extend(next.iter().copied());
            }
        }

        // In-degrees within the subgraph. Reachability is closed under
        // outgoing edges, so every edge target is present.
        let mut in_degree: HashMap<TransactionId, usize> =
            reachable.iter().map(|&t| (t, 0)).collect();
        for t in &reachable {
            if let Some(next) = state.wait_for.get(t) {
                for n in next {
                    *in_degree.get_mut(n).expect("edge target is reachable") += 1;
                }
            }
        }

        // Repeatedly strip nodes nobody waits on.
        let mut strippable: VecDeque<TransactionId> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&t, _)| t)
            .collect();
        let mut stripped = 0usize;
        while let Some(t) = strippable.pop_front() {
            stripped += 1;
            if let Some(next) = state.wait_for.get(&t) {
                for n in next {
                    let d = in_degree.get_mut(n).expect("edge target is reachable");
                    *d -= 1;
                    if *d == 0 {
                        strippable.push_back(*n);
                    }
                }
            }
        }

        if stripped == reachable.len() {
            return None;
        }

        // The residue holds the cycle plus everything blocked behind it.
        // Only a transaction whose own wait chain loops back to itself may
        // be aborted; aborting a downstream waiter would leave the cycle
        // intact, and that waiter's own poll would never elect it.
        let on_cycle = |start: TransactionId| {
            let mut seen: HashSet<TransactionId> = HashSet::new();
            let mut queue: VecDeque<TransactionId> = state
                .wait_for
                .get(&start)
                .map(|next| next.iter().copied().collect())
                .unwrap_or_default();
            while let Some(t) = queue.pop_front() {
                if t == start {
                    return true;
                }
                if seen.insert(t) {
                    if let Some(next) = state.wait_for.get(&t) {
                        queue.extend(next.iter().copied());
                    }
                }
            }
            false
        };
        let victim = reachable
            .iter()
            .filter(|&&t| in_degree[&t] > 0 && on_cycle(t))
            .max()
            .copied();
        if let Some(v) = victim {
            warn!("deadlock on the wait chain of {tid}, victim {v}");
        }
        victim
    }
}
