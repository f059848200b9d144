//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//!
//! A node carries no user value. Values live in the typed handles
//! (`Signal<T>`, `Computed<T>`, ...); the node only knows its flags, its
//! version, and the heads and tails of its two edge lists.

use std::borrow::Cow;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use slotmap::new_key_type;
use smallvec::SmallVec;

use super::link::LinkId;

new_key_type! {
    /// Unique identifier for a node in the dependency graph.
    ///
    /// Ids are generational: once a node is disposed its id never resolves
    /// again, even if the slot is reused by a later node.
    pub struct NodeId;
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A source node (signal). Has subscribers, never dependencies.
    Signal,

    /// A derived node. Has dependencies and may have subscribers.
    /// It caches its computed value.
    Computed,

    /// A side-effecting sink that re-runs its whole body.
    Effect,

    /// A sink that re-reads its sources and only calls back on change.
    Watcher,

    /// A disposal owner with no data-flow role.
    Scope,
}

impl NodeKind {
    /// Whether nodes of this kind are queued and run by the scheduler.
    pub fn is_sink(self) -> bool {
        matches!(self, NodeKind::Effect | NodeKind::Watcher)
    }

    /// Whether nodes of this kind own the nodes created while they run.
    pub fn is_owner(self) -> bool {
        matches!(self, NodeKind::Effect | NodeKind::Watcher | NodeKind::Scope)
    }

    fn initial_flags(self) -> Flags {
        match self {
            NodeKind::Signal => Flags::MUTABLE,
            // Start dirty to ensure the first read computes.
            NodeKind::Computed => Flags::DIRTY,
            NodeKind::Effect | NodeKind::Watcher => Flags::WATCHING,
            NodeKind::Scope => Flags::NONE,
        }
    }
}

/// Bitset of node states.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Flags(u16);

impl Flags {
    pub const NONE: Flags = Flags(0);
    /// The node is a source.
    pub const MUTABLE: Flags = Flags(1 << 0);
    /// The node is an effect sink.
    pub const WATCHING: Flags = Flags(1 << 1);
    /// Set only while an effect's first run is in flight.
    pub const RECURSED_CHECK: Flags = Flags(1 << 2);
    /// Confirmed need to recompute or re-run.
    pub const DIRTY: Flags = Flags(1 << 3);
    /// Some upstream node changed; need not yet resolved.
    pub const PENDING: Flags = Flags(1 << 4);
    /// The getter or body is executing.
    pub const RUNNING: Flags = Flags(1 << 5);
    /// The node sits in the scheduler queue.
    pub const QUEUED: Flags = Flags(1 << 6);
    /// A watcher that has been paused.
    pub const PAUSED: Flags = Flags(1 << 7);
    /// Disposal has started.
    pub const DISPOSED: Flags = Flags(1 << 8);
    /// The next write skips the equality check.
    pub const FORCE_NOTIFY: Flags = Flags(1 << 9);
    /// The sink has completed at least one run.
    pub const INITIALIZED: Flags = Flags(1 << 10);

    /// Mask of the two staleness states.
    pub const STALE: Flags = Flags(Self::DIRTY.0 | Self::PENDING.0);

    const NAMES: [(Flags, &'static str); 11] = [
        (Flags::MUTABLE, "MUTABLE"),
        (Flags::WATCHING, "WATCHING"),
        (Flags::RECURSED_CHECK, "RECURSED_CHECK"),
        (Flags::DIRTY, "DIRTY"),
        (Flags::PENDING, "PENDING"),
        (Flags::RUNNING, "RUNNING"),
        (Flags::QUEUED, "QUEUED"),
        (Flags::PAUSED, "PAUSED"),
        (Flags::DISPOSED, "DISPOSED"),
        (Flags::FORCE_NOTIFY, "FORCE_NOTIFY"),
        (Flags::INITIALIZED, "INITIALIZED"),
    ];

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    pub const fn is_stale(self) -> bool {
        self.intersects(Self::STALE)
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// How a reaction is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// A regular run: cleanups fire first, callbacks may fire.
    Full,

    /// Re-read sources to refresh links and remembered values, no side
    /// effects. Used by watcher resume and `ignore_updates`.
    Retrack,
}

/// The operations that differ between node kinds.
///
/// The runtime installs the tracking context before calling `execute` and
/// tears it down afterwards; implementors only run user code.
pub(crate) trait Reaction {
    /// Run the getter or body. Returns whether the produced value changed;
    /// sinks always return `true`.
    fn execute(&self, kind: RunKind) -> bool;
}

/// How a node refers to its reaction.
///
/// Computeds are referenced weakly so that dropping the last handle frees
/// them; effects and watchers are kept alive by the graph until disposed.
pub(crate) enum ReactionRef {
    Strong(Rc<dyn Reaction>),
    Weak(Weak<dyn Reaction>),
}

impl ReactionRef {
    pub(crate) fn upgrade(&self) -> Option<Rc<dyn Reaction>> {
        match self {
            ReactionRef::Strong(rc) => Some(Rc::clone(rc)),
            ReactionRef::Weak(weak) => weak.upgrade(),
        }
    }
}

pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// A node in the dependency graph.
pub struct Node {
    /// What kind of node this is.
    kind: NodeKind,

    /// Optional diagnostic name.
    name: Option<Cow<'static, str>>,

    pub(crate) flags: Flags,

    /// Bumped only when the committed value actually changes.
    pub(crate) version: u64,

    /// Global clock value at which this node was last known to be clean.
    pub(crate) verified_at: u64,

    /// Tracking epoch of the current (or last) run.
    pub(crate) epoch: u64,

    pub(crate) deps_head: Option<LinkId>,
    pub(crate) deps_tail: Option<LinkId>,
    pub(crate) subs_head: Option<LinkId>,
    pub(crate) subs_tail: Option<LinkId>,
    pub(crate) dep_count: usize,
    pub(crate) sub_count: usize,

    /// Disposal owner active at creation time.
    pub(crate) owner: Option<NodeId>,

    /// Nodes created while this node was the active owner, in creation order.
    pub(crate) owned: IndexSet<NodeId>,

    pub(crate) cleanups: SmallVec<[Cleanup; 2]>,

    pub(crate) reaction: Option<ReactionRef>,

    /// Dispose when the last subscriber goes away.
    pub(crate) auto_dispose: bool,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            name: None,
            flags: kind.initial_flags(),
            version: 0,
            verified_at: 0,
            epoch: 0,
            deps_head: None,
            deps_tail: None,
            subs_head: None,
            subs_tail: None,
            dep_count: 0,
            sub_count: 0,
            owner: None,
            owned: IndexSet::new(),
            cleanups: SmallVec::new(),
            reaction: None,
            auto_dispose: false,
        }
    }

    pub(crate) fn named(mut self, name: Option<Cow<'static, str>>) -> Self {
        self.name = name;
        self
    }

    pub(crate) fn with_reaction(mut self, reaction: ReactionRef) -> Self {
        self.reaction = Some(reaction);
        self
    }

    pub(crate) fn with_auto_dispose(mut self, auto_dispose: bool) -> Self {
        self.auto_dispose = auto_dispose;
        self
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the node's diagnostic name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Get the current flags.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Get the write version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of producers this node read during its last run.
    pub fn dependency_count(&self) -> usize {
        self.dep_count
    }

    /// Number of consumers currently reading this node.
    pub fn subscriber_count(&self) -> usize {
        self.sub_count
    }

    /// Check if the node needs no processing.
    pub fn is_clean(&self) -> bool {
        !self.flags.is_stale()
    }

    /// Mark as confirmed dirty. Dirty dominates pending.
    pub fn mark_dirty(&mut self) {
        self.flags.remove(Flags::PENDING);
        self.flags.insert(Flags::DIRTY);
    }

    /// Mark as pending unless already dirty.
    pub fn mark_pending(&mut self) {
        if !self.flags.contains(Flags::DIRTY) {
            self.flags.insert(Flags::PENDING);
        }
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.flags.remove(Flags::STALE);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("version", &self.version)
            .field("dependency_count", &self.dep_count)
            .field("subscriber_count", &self.sub_count)
            .finish()
    }
}
