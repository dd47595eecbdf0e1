// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Delta Replication
//!
//! An incremental state-replication engine: tracks per-field mutations on a
//! tree of stateful objects, assigns monotonic version stamps to changes, and
//! produces a minimal diff payload describing everything that changed between
//! two versions, suitable for shipping to a remote peer that applies it to
//! reconstruct equivalent state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                            delta-replication                             │
//! │                                                                          │
//! │   host writes                 sender                       receiver      │
//! │  ┌───────────┐    ┌─────────────────────────┐    ┌────────────────────┐  │
//! │  │ intercept │───►│ ReplicationNode         │    │ DiffApplier        │  │
//! │  │ (external)│    │  RecordStore per node   │──► │  merge into target │  │
//! │  └───────────┘    │  gen_diff(from, to)     │    │  (ApplyTarget)     │  │
//! │                   └─────────────────────────┘    └────────────────────┘  │
//! │                        │              ▲                    ▲             │
//! │                        ▼              │                    │             │
//! │                 ┌──────────────┐ ┌───────────┐      ┌───────────────┐    │
//! │                 │ LazyRegistry │ │ Baseline  │      │ MirrorObject  │    │
//! │                 │ (first diff) │ │ Store     │      │ (stock target)│    │
//! │                 └──────────────┘ └───────────┘      └───────────────┘    │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Control flow: the host mutates a field → calls
//! [`ReplicationNode::record_assignment`] → the record updates and the change
//! bubbles to ancestors → the host periodically calls
//! [`gen_diff`](ReplicationNode::gen_diff) on a root → the payload ships over
//! whatever transport → the remote peer calls [`DiffApplier::apply`] on a
//! mirror.
//!
//! Transport, byte-level serialization, and the write-interception mechanism
//! are external collaborators; this crate is the versioning and
//! reconciliation core.
//!
//! ## Concurrency Model
//!
//! Single-threaded, synchronous, cooperative: no operation suspends or
//! blocks, and every algorithm is a data-structure walk bounded by the
//! reachable changed subtree. The design assumes external serialization of
//! all writes and diff calls for a given graph (e.g. one logic tick per
//! network frame); nodes are `Rc<RefCell<_>>` handles with `Weak` parent
//! edges and carry no locking.
//!
//! ## Usage
//!
//! ```rust
//! use delta_replication::{DiffApplier, FieldValue, MirrorObject, ReplicationNode, Scalar};
//!
//! // Sender: the host object model calls in on every write
//! let root = ReplicationNode::new();
//! let pos = ReplicationNode::new();
//! root.record_assignment("hp", Some(100i64.into()));
//! root.record_assignment("pos", Some(FieldValue::Node(pos.clone())));
//! pos.record_assignment("x", Some(3i64.into()));
//!
//! // Produce the payload for the range [0, 1]: a first full sync
//! let diff = root.gen_diff(0, 1).expect("valid range").expect("changes");
//!
//! // Receiver: merge into a mirror
//! let mut mirror = MirrorObject::new();
//! let report = DiffApplier::new().apply(&diff, &mut mirror);
//! assert!(report.is_clean());
//! assert_eq!(mirror.lookup("pos.x").unwrap().as_scalar(), Some(&Scalar::Int(3)));
//! ```

pub mod apply;
pub mod baseline;
pub mod diff;
pub mod error;
pub mod metrics;
pub mod node;
pub mod record;
pub mod registry;
pub mod value;

// Re-exports for convenience
pub use apply::{ApplyReport, ApplyTarget, DiffApplier, FieldSlot, MirrorObject, MirrorValue};
pub use baseline::BaselineStore;
pub use diff::{Diff, DiffEntry};
pub use error::{ReplicationError, Result};
pub use node::ReplicationNode;
pub use record::{PropertyRecord, RecordStore};
pub use registry::{FieldConfig, FieldRegistration, LazyRegistry};
pub use value::{FieldValue, Scalar};
