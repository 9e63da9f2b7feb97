// SPDX-License-Identifier: BSD-3-Clause
//! Dynamic points-to and call-context fact extraction for a managed-runtime
//! program analysis pipeline. Two halves form one pipeline: the
//! [`bytecode`] rewriter instruments compiled method bodies ahead of
//! execution so that allocations and calls are tagged with runtime calling
//! contexts, and the [`analysis::memory`] engine walks a heap snapshot of
//! the context-tagged object graph afterwards, emitting typed relational
//! facts through a pluggable heap abstraction.

pub mod abstraction;
pub mod analysis;
pub mod bytecode;
pub mod cli;
pub mod database;
pub mod fact;
pub mod snapshot;

pub use abstraction::HeapAbstraction;
pub use database::Database;
pub use fact::{DynamicFact, IMMUTABLE_CONTEXT, NULL_PSEUDO_HEAP};
pub use snapshot::{Dump, HeapThing, ObjectId, Snapshot, Value};
