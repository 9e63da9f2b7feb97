// SPDX-License-Identifier: BSD-3-Clause
//! Per-method instruction-stream rewrite pass. Without changing a method's
//! observable semantics, the pass injects recorder invocations at method
//! entry, after object construction, and around call sites, then recomputes
//! the declared operand-stack requirement for the instrumented stream.
//!
//! Timing contract for context merges: merge *after* initializer calls
//! (merging before them corrupts static verification of stack types, at the
//! accepted cost of losing merges for initializers that never return), and
//! conceptually *before* any other call. The merge before non-initializer
//! calls is currently elided and only logged, reproducing the behavior of
//! the recording runtime this pass was built against.

use tracing::{debug, trace, warn};

use super::error::RewriteError;
use super::instruction::{max_depth, AccessFlags, Instruction};
use super::recorder::Recorder;
use super::{Class, ClassModule, Method, INIT};

#[derive(Clone, Copy, Debug, Default)]
pub struct RewriteOptions {
    /// Enable the method-entry call-edge hook for non-static, non-abstract
    /// methods.
    pub instrument_call_edges: bool,
    /// Track every pending allocation instead of only the most recent one,
    /// and make a pairing mismatch fatal instead of best-effort.
    pub strict_pairing: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ClassRewriter {
    opts: RewriteOptions,
}

/// Classes never touched by instrumentation: the recorder runtime, this
/// tooling, and value classes the recording runtime cannot safely tag.
/// Excluding the recorder namespace also makes the pass idempotent over its
/// own output's runtime.
pub fn is_interesting_class(name: &str) -> bool {
    let dotted = name.replace('/', ".");
    if dotted.starts_with("ctxrec") || dotted.starts_with("dynheap") {
        return false;
    }
    if dotted == "java.lang.Integer" || dotted == "java.lang.String" {
        return false;
    }
    true
}

impl ClassRewriter {
    pub fn new(opts: RewriteOptions) -> Self {
        ClassRewriter { opts }
    }

    pub fn rewrite_module(&self, module: &ClassModule) -> Result<ClassModule, RewriteError> {
        let mut classes = Vec::with_capacity(module.classes.len());
        for class in &module.classes {
            classes.push(self.rewrite_class(class)?);
        }
        Ok(ClassModule { classes })
    }

    pub fn rewrite_class(&self, class: &Class) -> Result<Class, RewriteError> {
        if !is_interesting_class(&class.name) {
            trace!(class = %class.name, "not an interesting class");
            return Ok(class.clone());
        }
        let mut methods = Vec::with_capacity(class.methods.len());
        for method in &class.methods {
            methods.push(self.rewrite_method(&class.name, method)?);
        }
        Ok(Class {
            name: class.name.clone(),
            methods,
        })
    }

    pub fn rewrite_method(&self, class_name: &str, method: &Method) -> Result<Method, RewriteError> {
        if method.access.contains(AccessFlags::NATIVE) {
            debug!(class = class_name, method = %method.name, "ignoring native method");
            return Ok(method.clone());
        }
        if method.access.contains(AccessFlags::ABSTRACT) {
            return Ok(method.clone());
        }

        let is_static = method.is_static();
        let is_constructor = method.is_constructor();
        // Call-edge recording needs a receiver, so it is only ever enabled
        // for non-static (and by the check above, non-abstract) methods.
        let instrument_call_edges = self.opts.instrument_call_edges && !is_static;

        let mut pass = MethodPass {
            opts: self.opts,
            class_name,
            method_name: &method.name,
            is_static,
            is_constructor,
            pending: Vec::new(),
            out: Vec::with_capacity(method.code.len() + 8),
        };

        if instrument_call_edges {
            debug!(
                class = class_name,
                method = %method.name,
                "inserting recordCall() at method entry"
            );
            pass.out.push(Instruction::LoadLocal { slot: 0 });
            pass.out.push(Recorder::record_call());
        }

        for insn in &method.code {
            pass.visit(insn)?;
        }

        let depth = max_depth(&format!("{}.{}", class_name, method.name), &pass.out)?;
        Ok(Method {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            access: method.access,
            max_stack: method.max_stack.max(depth),
            code: pass.out,
        })
    }
}

/// State held only while one method body is being rewritten.
struct MethodPass<'a> {
    opts: RewriteOptions,
    class_name: &'a str,
    method_name: &'a str,
    is_static: bool,
    is_constructor: bool,
    /// Types of not-yet-initialized allocations. In the default mode at most
    /// one entry is kept and a second allocation overwrites the first; in
    /// strict mode this is a real stack.
    pending: Vec<String>,
    out: Vec<Instruction>,
}

impl MethodPass<'_> {
    fn visit(&mut self, insn: &Instruction) -> Result<(), RewriteError> {
        match insn {
            Instruction::New { class } => {
                self.out.push(insn.clone());
                if !self.opts.strict_pairing {
                    self.pending.clear();
                }
                self.pending.push(class.clone());
            }
            Instruction::NewArray { class, .. } => {
                // Arrays have no separate initializer call, so they are
                // recorded immediately.
                self.out.push(insn.clone());
                debug!(
                    class = self.class_name,
                    method = self.method_name,
                    array = %class,
                    "instrumenting array allocation"
                );
                self.record_new_obj();
            }
            Instruction::Invoke { owner, name, .. } => {
                self.visit_invoke(insn, owner, name)?;
            }
            _ => self.out.push(insn.clone()),
        }
        Ok(())
    }

    fn visit_invoke(
        &mut self,
        insn: &Instruction,
        owner: &str,
        name: &str,
    ) -> Result<(), RewriteError> {
        // Constructor bodies are excluded from call recording.
        if self.is_constructor {
            self.out.push(insn.clone());
            return Ok(());
        }

        if name != INIT {
            // A context merge is conceptually due here, before the call; see
            // the module docs for why it is not emitted.
            trace!(
                class = self.class_name,
                method = self.method_name,
                callee = %format!("{}.{}", owner, name),
                "context merge before call elided"
            );
            self.out.push(insn.clone());
            return Ok(());
        }

        self.out.push(insn.clone());

        // An initializer call completes the most recent pending allocation:
        // the compiler's `Dup` after `New` left one reference on the stack
        // beyond the one this call just consumed.
        if let Some(pending) = self.pending.pop() {
            if pending != owner {
                if self.opts.strict_pairing {
                    return Err(RewriteError::PairingMismatch {
                        method: format!("{}.{}", self.class_name, self.method_name),
                        pending,
                        owner: owner.to_string(),
                    });
                }
                warn!(
                    class = self.class_name,
                    method = self.method_name,
                    pending = %pending,
                    owner = %owner,
                    "allocation pairing heuristic failed"
                );
            }
            debug!(
                class = self.class_name,
                method = self.method_name,
                allocated = %owner,
                "instrumenting allocation after initializer"
            );
            self.record_new_obj();
        }

        // Merging before an initializer call would fail verification, so the
        // merge lands after it instead.
        self.call_merge();
        Ok(())
    }

    /// Record the just-constructed object on top of the stack, leaving the
    /// stack exactly as found.
    fn record_new_obj(&mut self) {
        if self.is_static {
            self.out.push(Instruction::Dup);
            self.out.push(Recorder::record_static());
        } else {
            // Allocations inside constructor bodies are not recorded.
            if self.is_constructor {
                return;
            }
            self.out.push(Instruction::Dup);
            self.out.push(Instruction::LoadLocal { slot: 0 });
            self.out.push(Recorder::record());
        }
    }

    fn call_merge(&mut self) {
        if self.is_static {
            self.out.push(Recorder::merge_static());
        } else {
            self.out.push(Instruction::LoadLocal { slot: 0 });
            self.out.push(Recorder::merge());
        }
    }
}
