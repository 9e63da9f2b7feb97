// SPDX-License-Identifier: BSD-3-Clause
//! Fact sink. One tab-separated `.facts` file per relation, created lazily in
//! the output directory handed over at construction. Writes are idempotent
//! per fact value; [`Database::close`] consumes the database, so writing
//! after close is unrepresentable.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::fact::DynamicFact;

#[derive(Debug)]
pub struct Database {
    dir: PathBuf,
    writers: FxHashMap<&'static str, BufWriter<File>>,
    seen: FxHashSet<DynamicFact>,
}

impl Database {
    pub fn new(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Database {
            dir: dir.to_path_buf(),
            writers: FxHashMap::default(),
            seen: FxHashSet::default(),
        })
    }

    /// Append one fact row. A fact value already written in this run is
    /// silently dropped.
    pub fn write_fact(&mut self, fact: &DynamicFact) -> io::Result<()> {
        if !self.seen.insert(fact.clone()) {
            return Ok(());
        }
        let relation = fact.relation();
        let writer = match self.writers.entry(relation) {
            std::collections::hash_map::Entry::Occupied(o) => o.into_mut(),
            std::collections::hash_map::Entry::Vacant(v) => {
                let path = self.dir.join(format!("{}.facts", relation));
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                v.insert(BufWriter::new(file))
            }
        };
        writeln!(writer, "{}", fact)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    pub fn close(mut self) -> io::Result<()> {
        self.flush()
    }
}
