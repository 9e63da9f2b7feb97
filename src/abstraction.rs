// SPDX-License-Identifier: BSD-3-Clause
//! Pluggable heap-object abstraction. A sensitivity variant maps each live
//! heap value to a stable string identifier used as the object column of
//! emitted facts; the mapping must be deterministic within one run so that
//! two references to the same object collapse to the same identifier.
//!
//! Variants are resolved from their sensitivity label through a static
//! registry; unknown labels fail before any dump is read.

use std::sync::Arc;

use dashmap::DashSet;

use crate::fact::{DynamicFact, NULL_PSEUDO_HEAP};
use crate::snapshot::{HeapThing, ObjectId, PlainObject, Snapshot, Value};

/// Sensitivity labels accepted by [`create`].
pub const SENSITIVITIES: &[&str] = &["insensitive", "alloc-site", "context"];

#[derive(Debug, thiserror::Error)]
#[error("unknown sensitivity label: {0}")]
pub struct UnknownSensitivity(pub String);

#[derive(Debug, thiserror::Error)]
#[error("unresolved heap reference: {0}")]
pub struct DanglingRef(pub ObjectId);

pub trait HeapAbstraction: Send + Sync {
    /// Abstraction identifier for one heap value. Null and primitive values
    /// map to the designated null pseudo-heap.
    fn abstraction_of(&self, value: &Value) -> Result<String, DanglingRef>;

    /// Facts intrinsic to this sensitivity variant, accumulated over the
    /// whole traversal (e.g. the context-naming table).
    fn dynamic_facts(&self) -> Vec<DynamicFact> {
        Vec::new()
    }
}

/// Surface a bad label before any processing begins.
pub fn validate(label: &str) -> Result<(), UnknownSensitivity> {
    if SENSITIVITIES.contains(&label) {
        Ok(())
    } else {
        Err(UnknownSensitivity(label.to_string()))
    }
}

pub fn create(
    label: &str,
    snapshot: Arc<Snapshot>,
    strings: bool,
) -> Result<Box<dyn HeapAbstraction>, UnknownSensitivity> {
    match label {
        "insensitive" => Ok(Box::new(Insensitive { snapshot, strings })),
        "alloc-site" => Ok(Box::new(AllocSite { snapshot, strings })),
        "context" => Ok(Box::new(ContextSensitive {
            snapshot,
            strings,
            contexts: DashSet::new(),
        })),
        _ => Err(UnknownSensitivity(label.to_string())),
    }
}

/// Literal identifier for a string-constant object, used only in the
/// experimental string extraction mode.
fn string_constant(obj: &PlainObject, strings: bool) -> Option<String> {
    if !strings {
        return None;
    }
    obj.string.as_deref().map(|s| format!("\"{}\"", s))
}

fn resolve(snapshot: &Snapshot, id: ObjectId) -> Result<&HeapThing, DanglingRef> {
    snapshot.thing(id).ok_or(DanglingRef(id))
}

/// One abstract object per class: the coarsest variant.
struct Insensitive {
    snapshot: Arc<Snapshot>,
    strings: bool,
}

impl HeapAbstraction for Insensitive {
    fn abstraction_of(&self, value: &Value) -> Result<String, DanglingRef> {
        let id = match value {
            Value::Null | Value::Prim => return Ok(NULL_PSEUDO_HEAP.to_string()),
            Value::Ref(id) => *id,
        };
        Ok(match resolve(&self.snapshot, id)? {
            HeapThing::Object(o) => {
                string_constant(o, self.strings).unwrap_or_else(|| o.class.clone())
            }
            HeapThing::ObjectArray(a) => a.class.clone(),
            HeapThing::PrimitiveArray(a) => a.class.clone(),
            HeapThing::Class(c) => format!("<class {}>", c.name),
        })
    }
}

/// One abstract object per recorded allocation site, with the class name as
/// the fallback for objects allocated outside instrumented code.
struct AllocSite {
    snapshot: Arc<Snapshot>,
    strings: bool,
}

impl AllocSite {
    fn site_or_class(site: &Option<String>, class: &str) -> String {
        site.clone().unwrap_or_else(|| class.to_string())
    }
}

impl HeapAbstraction for AllocSite {
    fn abstraction_of(&self, value: &Value) -> Result<String, DanglingRef> {
        let id = match value {
            Value::Null | Value::Prim => return Ok(NULL_PSEUDO_HEAP.to_string()),
            Value::Ref(id) => *id,
        };
        Ok(match resolve(&self.snapshot, id)? {
            HeapThing::Object(o) => string_constant(o, self.strings)
                .unwrap_or_else(|| Self::site_or_class(&o.site, &o.class)),
            HeapThing::ObjectArray(a) => Self::site_or_class(&a.site, &a.class),
            HeapThing::PrimitiveArray(a) => a.class.clone(),
            HeapThing::Class(c) => format!("<class {}>", c.name),
        })
    }
}

/// Allocation site qualified by the recorder's calling-context tag. Every
/// context encountered is named once in the accumulated context table.
struct ContextSensitive {
    snapshot: Arc<Snapshot>,
    strings: bool,
    contexts: DashSet<u64>,
}

impl ContextSensitive {
    fn qualified(&self, site: &Option<String>, context: &Option<u64>, class: &str) -> String {
        let base = AllocSite::site_or_class(site, class);
        match context {
            Some(ctx) => {
                self.contexts.insert(*ctx);
                format!("{}@{}", base, context_name(*ctx))
            }
            None => base,
        }
    }
}

fn context_name(ctx: u64) -> String {
    format!("<ctx {}>", ctx)
}

impl HeapAbstraction for ContextSensitive {
    fn abstraction_of(&self, value: &Value) -> Result<String, DanglingRef> {
        let id = match value {
            Value::Null | Value::Prim => return Ok(NULL_PSEUDO_HEAP.to_string()),
            Value::Ref(id) => *id,
        };
        Ok(match resolve(&self.snapshot, id)? {
            HeapThing::Object(o) => string_constant(o, self.strings)
                .unwrap_or_else(|| self.qualified(&o.site, &o.context, &o.class)),
            HeapThing::ObjectArray(a) => self.qualified(&a.site, &a.context, &a.class),
            HeapThing::PrimitiveArray(a) => a.class.clone(),
            HeapThing::Class(c) => format!("<class {}>", c.name),
        })
    }

    fn dynamic_facts(&self) -> Vec<DynamicFact> {
        self.contexts
            .iter()
            .map(|ctx| DynamicFact::CallingContext {
                context: context_name(*ctx),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::snapshot::{ObjectArray, PlainObject, Snapshot};

    fn one_object(site: Option<&str>, context: Option<u64>) -> Arc<Snapshot> {
        Arc::new(Snapshot::new(vec![HeapThing::Object(PlainObject {
            id: ObjectId(1),
            class: "com.acme.Foo".to_string(),
            fields: Default::default(),
            site: site.map(str::to_string),
            context,
            string: None,
        })]))
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(validate("insensitive").is_ok());
        assert!(validate("3ObjH").is_err());
        assert!(create("3ObjH", one_object(None, None), false).is_err());
    }

    #[test]
    fn null_maps_to_pseudo_heap() {
        let abs = create("insensitive", one_object(None, None), false).unwrap();
        assert_eq!(abs.abstraction_of(&Value::Null).unwrap(), NULL_PSEUDO_HEAP);
        assert_eq!(abs.abstraction_of(&Value::Prim).unwrap(), NULL_PSEUDO_HEAP);
    }

    #[test]
    fn dangling_reference_is_fatal() {
        let abs = create("insensitive", one_object(None, None), false).unwrap();
        assert!(abs.abstraction_of(&Value::Ref(ObjectId(99))).is_err());
    }

    #[test]
    fn alloc_site_falls_back_to_class() {
        let with_site = create("alloc-site", one_object(Some("Foo.bar/3"), None), false).unwrap();
        assert_eq!(
            with_site.abstraction_of(&Value::Ref(ObjectId(1))).unwrap(),
            "Foo.bar/3"
        );
        let without = create("alloc-site", one_object(None, None), false).unwrap();
        assert_eq!(
            without.abstraction_of(&Value::Ref(ObjectId(1))).unwrap(),
            "com.acme.Foo"
        );
    }

    #[test]
    fn context_variant_accumulates_context_table() {
        let abs = create("context", one_object(Some("Foo.bar/3"), Some(42)), false).unwrap();
        assert_eq!(
            abs.abstraction_of(&Value::Ref(ObjectId(1))).unwrap(),
            "Foo.bar/3@<ctx 42>"
        );
        // Same object again: the table still holds one entry.
        abs.abstraction_of(&Value::Ref(ObjectId(1))).unwrap();
        assert_eq!(
            abs.dynamic_facts(),
            vec![DynamicFact::CallingContext {
                context: "<ctx 42>".to_string()
            }]
        );
    }

    #[test]
    fn arrays_use_recorded_site() {
        let snapshot = Arc::new(Snapshot::new(vec![HeapThing::ObjectArray(ObjectArray {
            id: ObjectId(2),
            class: "com.acme.Foo[]".to_string(),
            elements: Vec::new(),
            site: Some("Foo.mk/7".to_string()),
            context: None,
        })]));
        let abs = create("alloc-site", snapshot, false).unwrap();
        assert_eq!(
            abs.abstraction_of(&Value::Ref(ObjectId(2))).unwrap(),
            "Foo.mk/7"
        );
    }
}
