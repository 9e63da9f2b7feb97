// SPDX-License-Identifier: BSD-3-Clause
//! Call contract of the always-loaded runtime recorder. The rewriter only
//! ever emits static invocations of these five entry points; the recorder
//! itself maintains the live calling-context stack and is presumed
//! thread-safe per receiver object.

use super::instruction::{Instruction, InvokeKind};

pub struct Recorder;

impl Recorder {
    /// Slash-internal name of the recorder class.
    pub const CLASS: &'static str = "ctxrec/Recorder";

    fn invoke(name: &str, descriptor: &str) -> Instruction {
        Instruction::Invoke {
            kind: InvokeKind::Static,
            owner: Self::CLASS.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }

    /// A traced method was entered with this receiver.
    pub fn record_call() -> Instruction {
        Self::invoke("recordCall", "(Ljava/lang/Object;)V")
    }

    /// A new object was constructed within the receiver's calling context.
    pub fn record() -> Instruction {
        Self::invoke("record", "(Ljava/lang/Object;Ljava/lang/Object;)V")
    }

    /// A new object was constructed within a static calling context.
    pub fn record_static() -> Instruction {
        Self::invoke("recordStatic", "(Ljava/lang/Object;)V")
    }

    /// Merge the receiver's context into the context of its callee.
    pub fn merge() -> Instruction {
        Self::invoke("merge", "(Ljava/lang/Object;)V")
    }

    pub fn merge_static() -> Instruction {
        Self::invoke("mergeStatic", "()V")
    }
}
