// SPDX-License-Identifier: BSD-3-Clause
//! In-memory representation of a captured heap snapshot: the read-only image
//! of a program's live object graph at one point in time, pre-digested to
//! JSON by an external dump converter. Every live heap thing is one of a
//! plain object, an object array, a primitive array, or a class object
//! carrying static state.

use std::fmt::Display;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A field or array slot. Primitive scalars carry no pointer information and
/// are collapsed to a single variant.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Value {
    Null,
    Ref(ObjectId),
    Prim,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlainObject {
    pub id: ObjectId,
    /// Dotted class name, e.g. `com.acme.Foo`.
    pub class: String,
    #[serde(default)]
    pub fields: FxHashMap<String, Value>,
    /// Allocation site recorded by the instrumented program, when available.
    #[serde(default)]
    pub site: Option<String>,
    /// Calling-context tag attached by the runtime recorder.
    #[serde(default)]
    pub context: Option<u64>,
    /// Literal contents, present only for string objects.
    #[serde(default)]
    pub string: Option<String>,
}

impl PlainObject {
    /// Flat field lookup by name; an unset field reads as null.
    pub fn field(&self, name: &str) -> Value {
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectArray {
    pub id: ObjectId,
    pub class: String,
    pub elements: Vec<Value>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub context: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveArray {
    pub id: ObjectId,
    pub class: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassObject {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    /// Instance fields declared by this class (not its ancestors).
    #[serde(default)]
    pub instance_fields: Vec<String>,
    #[serde(default)]
    pub statics: Vec<(String, Value)>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HeapThing {
    Object(PlainObject),
    ObjectArray(ObjectArray),
    PrimitiveArray(PrimitiveArray),
    Class(ClassObject),
}

impl HeapThing {
    /// The dotted name of the thing's class; for class objects, the class
    /// they represent.
    pub fn class_name(&self) -> &str {
        match self {
            HeapThing::Object(o) => &o.class,
            HeapThing::ObjectArray(a) => &a.class,
            HeapThing::PrimitiveArray(a) => &a.class,
            HeapThing::Class(c) => &c.name,
        }
    }
}

/// Wire format of one dump file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dump {
    pub things: Vec<HeapThing>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("couldn't read heap dump {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed heap dump {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// A parsed snapshot with id and class indices built once up front.
#[derive(Debug)]
pub struct Snapshot {
    things: Vec<HeapThing>,
    by_id: FxHashMap<ObjectId, usize>,
    classes: FxHashMap<String, usize>,
}

impl Snapshot {
    pub fn new(things: Vec<HeapThing>) -> Self {
        let mut by_id = FxHashMap::default();
        let mut classes = FxHashMap::default();
        for (idx, thing) in things.iter().enumerate() {
            match thing {
                HeapThing::Object(o) => {
                    by_id.insert(o.id, idx);
                }
                HeapThing::ObjectArray(a) => {
                    by_id.insert(a.id, idx);
                }
                HeapThing::PrimitiveArray(a) => {
                    by_id.insert(a.id, idx);
                }
                HeapThing::Class(c) => {
                    classes.insert(c.name.clone(), idx);
                }
            }
        }
        Snapshot {
            things,
            by_id,
            classes,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let dump: Dump =
            serde_json::from_str(&contents).map_err(|source| SnapshotError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Snapshot::new(dump.things))
    }

    pub fn things(&self) -> &[HeapThing] {
        &self.things
    }

    pub fn thing(&self, id: ObjectId) -> Option<&HeapThing> {
        self.by_id.get(&id).map(|idx| &self.things[*idx])
    }

    pub fn class(&self, name: &str) -> Option<&ClassObject> {
        self.classes.get(name).map(|idx| match &self.things[*idx] {
            HeapThing::Class(c) => c,
            _ => unreachable!("classes index only holds class objects"),
        })
    }

    /// The class and every ancestor class in its inheritance chain, starting
    /// from `name`. The chain ends at the first class the dump doesn't
    /// describe.
    pub fn class_chain<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a ClassObject> {
        let mut next = self.class(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.superclass.as_deref().and_then(|s| self.class(s));
            Some(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str, superclass: Option<&str>, fields: &[&str]) -> HeapThing {
        HeapThing::Class(ClassObject {
            name: name.to_string(),
            superclass: superclass.map(str::to_string),
            instance_fields: fields.iter().map(|f| f.to_string()).collect(),
            statics: Vec::new(),
        })
    }

    #[test]
    fn chain_walks_ancestors() {
        let snapshot = Snapshot::new(vec![
            class("Base", None, &["b"]),
            class("Mid", Some("Base"), &["m"]),
            class("Leaf", Some("Mid"), &["l"]),
        ]);
        let names: Vec<&str> = snapshot
            .class_chain("Leaf")
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Leaf", "Mid", "Base"]);
    }

    #[test]
    fn chain_stops_at_undescribed_superclass() {
        let snapshot = Snapshot::new(vec![class("Leaf", Some("java.lang.Object"), &[])]);
        assert_eq!(snapshot.class_chain("Leaf").count(), 1);
        assert_eq!(snapshot.class_chain("absent").count(), 0);
    }

    #[test]
    fn round_trips_through_json() {
        let dump = Dump {
            things: vec![HeapThing::PrimitiveArray(PrimitiveArray {
                id: ObjectId(7),
                class: "int[]".to_string(),
            })],
        };
        let json = serde_json::to_string(&dump).unwrap();
        let back: Dump = serde_json::from_str(&json).unwrap();
        assert_eq!(dump, back);
    }
}
