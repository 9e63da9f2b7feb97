// SPDX-License-Identifier: BSD-3-Clause
//! Serialized class-module representation consumed and produced by the
//! instruction-stream rewriter. Class names use the slash-internal form
//! (`com/acme/Foo`); method descriptors follow the usual managed-runtime
//! syntax (`(Ljava/lang/Object;I)V`). Every value occupies exactly one
//! operand-stack slot in this representation.

use std::path::Path;

use serde::{Deserialize, Serialize};

mod error;
pub use error::*;
pub mod instruction;
pub use instruction::{AccessFlags, Instruction, InvokeKind};
mod recorder;
pub use recorder::Recorder;
pub mod rewriter;

/// Name of the initializer method paired with allocation instructions.
pub const INIT: &str = "<init>";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub descriptor: String,
    pub access: AccessFlags,
    /// Declared operand-stack requirement for this method's code.
    pub max_stack: u16,
    #[serde(default)]
    pub code: Vec<Instruction>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == INIT
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    /// Slash-internal name.
    pub name: String,
    pub methods: Vec<Method>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassModule {
    pub classes: Vec<Class>,
}

impl ClassModule {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("couldn't read class module {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("malformed class module {}", path.display()))
    }

    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("couldn't write class module {}", path.display()))
    }
}
