// SPDX-License-Identifier: BSD-3-Clause
//! Heap-snapshot traversal: visit every live heap object of each input dump
//! exactly once, project its outgoing references into dynamic points-to
//! facts through the active heap abstraction, and accumulate the
//! deduplicated result across the whole batch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use rayon::prelude::*;
use tracing::{debug, error, info};

use crate::abstraction::{self, DanglingRef, UnknownSensitivity};
use crate::database::Database;
use crate::fact::{DynamicFact, IMMUTABLE_CONTEXT};
use crate::snapshot::{HeapThing, Snapshot, SnapshotError, Value};

/// Class-name prefixes whose objects are never projected into facts: the
/// runtime recorder and this tool's own namespace.
const EXCLUDED_PREFIXES: &[&str] = &["ctxrec", "dynheap"];

#[derive(Clone, Debug)]
pub struct Options {
    /// Sensitivity label naming the heap abstraction variant.
    pub sensitivity: String,
    /// (Experimental) treat unique string constants as pointer-bearing data.
    pub strings: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Classification(#[from] DanglingRef),
}

pub struct MemoryAnalysis {
    filenames: Vec<PathBuf>,
    opts: Options,
    dynamic_facts: DashSet<DynamicFact>,
}

impl MemoryAnalysis {
    pub fn new(filenames: Vec<PathBuf>, opts: Options) -> Result<Self, UnknownSensitivity> {
        abstraction::validate(&opts.sensitivity)?;
        if opts.strings {
            println!("(Experimental) strings in heap dumps will be analyzed.");
        }
        Ok(MemoryAnalysis {
            filenames,
            opts,
            dynamic_facts: DashSet::new(),
        })
    }

    fn interesting(&self, class: &str) -> bool {
        if EXCLUDED_PREFIXES.iter().any(|p| class.starts_with(p)) {
            return false;
        }
        if !self.opts.strings && class.starts_with("java.lang.String") {
            return false;
        }
        true
    }

    /// Walk one dump and fold its facts into the batch accumulator.
    pub fn resolve_facts_from_dump(&self, filename: &PathBuf) -> Result<(), MemoryError> {
        let snapshot = Arc::new(Snapshot::from_file(filename)?);
        let indexer = abstraction::create(&self.opts.sensitivity, snapshot.clone(), self.opts.strings)
            .expect("sensitivity label validated at construction");

        info!(dump = %filename.display(), "extracting facts from heap dump");

        let instance_facts: DashSet<DynamicFact> = DashSet::new();
        let array_facts: DashSet<DynamicFact> = DashSet::new();
        let static_facts: DashSet<DynamicFact> = DashSet::new();

        snapshot
            .things()
            .par_iter()
            .try_for_each(|thing| -> Result<(), MemoryError> {
                match thing {
                    HeapThing::Object(obj) => {
                        if !self.interesting(&obj.class) {
                            return Ok(());
                        }
                        let base = indexer.abstraction_of(&Value::Ref(obj.id))?;
                        // Ancestor classes declare distinct storage slots, so
                        // shadowed and inherited fields each get their own fact.
                        for class in snapshot.class_chain(&obj.class) {
                            for field in &class.instance_fields {
                                let target = indexer.abstraction_of(&obj.field(field))?;
                                instance_facts.insert(DynamicFact::InstanceFieldPointsTo {
                                    base: base.clone(),
                                    field: field.clone(),
                                    class: class.name.clone(),
                                    target,
                                });
                            }
                        }
                    }
                    HeapThing::ObjectArray(arr) => {
                        let base = indexer.abstraction_of(&Value::Ref(arr.id))?;
                        for value in &arr.elements {
                            // Null slots carry no edge.
                            if matches!(value, Value::Null) {
                                continue;
                            }
                            array_facts.insert(DynamicFact::ArrayIndexPointsTo {
                                base: base.clone(),
                                target: indexer.abstraction_of(value)?,
                            });
                        }
                    }
                    HeapThing::PrimitiveArray(_) => {
                        // No pointer semantics.
                    }
                    HeapThing::Class(class) => {
                        for (field, value) in &class.statics {
                            static_facts.insert(DynamicFact::StaticFieldPointsTo {
                                field: field.clone(),
                                class: class.name.clone(),
                                target: indexer.abstraction_of(value)?,
                            });
                        }
                    }
                }
                Ok(())
            })?;

        debug!(
            instance = instance_facts.len(),
            array = array_facts.len(),
            statics = static_facts.len(),
            "dump traversal complete"
        );

        for fact in static_facts {
            self.dynamic_facts.insert(fact);
        }
        for fact in instance_facts {
            self.dynamic_facts.insert(fact);
        }
        for fact in array_facts {
            self.dynamic_facts.insert(fact);
        }
        for fact in indexer.dynamic_facts() {
            self.dynamic_facts.insert(fact);
        }
        Ok(())
    }

    /// Process the whole batch and persist the accumulated facts. A failure
    /// on one dump is logged and the batch continues; the return value is
    /// the total deduplicated fact count.
    pub fn write_facts_to_db(&self, fact_dir: &std::path::Path) -> anyhow::Result<usize> {
        let mut db = Database::new(fact_dir)?;
        let mut context_written = false;

        for filename in &self.filenames {
            let start = Instant::now();
            match self.resolve_facts_from_dump(filename) {
                Ok(()) => {
                    println!("Heap dump analysis time: {:.2?}", start.elapsed());
                }
                Err(e) => {
                    error!(dump = %filename.display(), "failed to resolve heap dump: {e}");
                    eprintln!("skipping heap dump {}: {}", filename.display(), e);
                }
            }

            // The global context domain is written at most once per run.
            if !context_written {
                db.write_fact(&DynamicFact::CallingContext {
                    context: IMMUTABLE_CONTEXT.to_string(),
                })?;
                context_written = true;
            }

            for fact in self.dynamic_facts.iter() {
                db.write_fact(fact.key())?;
            }
        }

        db.close()?;
        Ok(self.dynamic_facts.len())
    }

    /// The facts accumulated so far, in no particular order.
    pub fn facts(&self) -> Vec<DynamicFact> {
        self.dynamic_facts.iter().map(|f| f.key().clone()).collect()
    }
}
