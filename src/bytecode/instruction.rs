// SPDX-License-Identifier: BSD-3-Clause
//! The instruction shapes the rewriter must understand, plus a passthrough
//! variant carrying its own stack effect. This is deliberately not a general
//! bytecode model; it covers exactly the patterns needed for call and
//! allocation recording.

use serde::{Deserialize, Serialize};

use super::error::RewriteError;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
    pub struct AccessFlags: u16 {
        const PUBLIC       = 0x0001;
        const PRIVATE      = 0x0002;
        const STATIC       = 0x0008;
        const FINAL        = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const NATIVE       = 0x0100;
        const ABSTRACT     = 0x0400;
    }
}

/// Access flags serialize as their raw bit pattern, matching the source
/// class-file encoding.
impl Serialize for AccessFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.bits())
    }
}

impl<'de> Deserialize<'de> for AccessFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(AccessFlags::from_bits_retain(u16::deserialize(
            deserializer,
        )?))
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Instruction {
    /// Allocate an uninitialized object. The source format guarantees the
    /// compiler follows every `New` with a `Dup`, leaving an extra duplicate
    /// reference for the initializer call to consume.
    New { class: String },
    /// Allocate an array; pops one count per dimension.
    NewArray { class: String, dims: u8 },
    Dup,
    Swap,
    Pop,
    Nop,
    PushConst,
    LoadLocal { slot: u16 },
    StoreLocal { slot: u16 },
    GetField { owner: String, field: String },
    PutField { owner: String, field: String },
    GetStatic { owner: String, field: String },
    PutStatic { owner: String, field: String },
    Invoke {
        kind: InvokeKind,
        owner: String,
        name: String,
        descriptor: String,
    },
    Return { value: bool },
    /// Anything the rewriter passes through untouched, with its stack effect
    /// spelled out so depth simulation stays exact.
    Raw {
        mnemonic: String,
        pops: u16,
        pushes: u16,
    },
}

impl Instruction {
    /// `(pops, pushes)` against the operand stack.
    pub fn stack_effect(&self) -> Result<(u16, u16), RewriteError> {
        Ok(match self {
            Instruction::New { .. } => (0, 1),
            Instruction::NewArray { dims, .. } => (u16::from(*dims), 1),
            Instruction::Dup => (1, 2),
            Instruction::Swap => (2, 2),
            Instruction::Pop => (1, 0),
            Instruction::Nop => (0, 0),
            Instruction::PushConst => (0, 1),
            Instruction::LoadLocal { .. } => (0, 1),
            Instruction::StoreLocal { .. } => (1, 0),
            Instruction::GetField { .. } => (1, 1),
            Instruction::PutField { .. } => (2, 0),
            Instruction::GetStatic { .. } => (0, 1),
            Instruction::PutStatic { .. } => (1, 0),
            Instruction::Invoke {
                kind, descriptor, ..
            } => {
                let (args, returns_value) = descriptor_arity(descriptor)?;
                let receiver = if *kind == InvokeKind::Static { 0 } else { 1 };
                (args + receiver, u16::from(returns_value))
            }
            Instruction::Return { value } => (u16::from(*value), 0),
            Instruction::Raw { pops, pushes, .. } => (*pops, *pushes),
        })
    }
}

/// Parse a method descriptor into its argument slot count and whether it
/// returns a value.
pub fn descriptor_arity(descriptor: &str) -> Result<(u16, bool), RewriteError> {
    let bad = || RewriteError::BadDescriptor(descriptor.to_string());
    let rest = descriptor.strip_prefix('(').ok_or_else(bad)?;
    let (params, ret) = rest.split_once(')').ok_or_else(bad)?;
    if ret.is_empty() {
        return Err(bad());
    }

    let mut args: u16 = 0;
    let mut chars = params.chars();
    while let Some(c) = chars.next() {
        match c {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => args += 1,
            'L' => {
                if !chars.by_ref().any(|c| c == ';') {
                    return Err(bad());
                }
                args += 1;
            }
            // Array dimensions prefix the element type and add no slot.
            '[' => {}
            _ => return Err(bad()),
        }
    }
    Ok((args, ret != "V"))
}

/// Simulate the linear instruction stream and report its maximum operand
/// stack depth. Underflow is a structural error.
pub fn max_depth(method: &str, code: &[Instruction]) -> Result<u16, RewriteError> {
    let mut depth: i32 = 0;
    let mut max: i32 = 0;
    for (index, insn) in code.iter().enumerate() {
        let (pops, pushes) = insn.stack_effect()?;
        depth -= i32::from(pops);
        if depth < 0 {
            return Err(RewriteError::StackUnderflow {
                method: method.to_string(),
                index,
            });
        }
        depth += i32::from(pushes);
        max = max.max(depth);
    }
    Ok(max as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_slot_counts() {
        assert_eq!(descriptor_arity("()V").unwrap(), (0, false));
        assert_eq!(descriptor_arity("(Ljava/lang/Object;)V").unwrap(), (1, false));
        assert_eq!(
            descriptor_arity("([[Ljava/lang/String;IJ)I").unwrap(),
            (3, true)
        );
        assert!(descriptor_arity("Ljava/lang/Object;").is_err());
        assert!(descriptor_arity("(Q)V").is_err());
        assert!(descriptor_arity("(I)").is_err());
    }

    #[test]
    fn depth_of_new_dup_init() {
        let code = vec![
            Instruction::New {
                class: "com/acme/Foo".to_string(),
            },
            Instruction::Dup,
            Instruction::Invoke {
                kind: InvokeKind::Special,
                owner: "com/acme/Foo".to_string(),
                name: "<init>".to_string(),
                descriptor: "()V".to_string(),
            },
            Instruction::Pop,
            Instruction::Return { value: false },
        ];
        assert_eq!(max_depth("t", &code).unwrap(), 2);
    }

    #[test]
    fn underflow_is_structural_error() {
        let code = vec![Instruction::Pop];
        assert!(matches!(
            max_depth("t", &code),
            Err(RewriteError::StackUnderflow { index: 0, .. })
        ));
    }
}
