//! Routine builder: the insertion point collaborators emit into.
//!
//! A builder is obtained from [`DynamicModule::define_routine`]. Instructions
//! accumulate privately; nothing is visible in the module (or included in a
//! saved artifact) until [`RoutineBuilder::finish`] verifies and publishes the
//! body.

use std::sync::Arc;

use crate::error::RoutineResult;
use crate::module::DynamicModule;

use super::{Instr, Routine, RoutineSignature, verify_body};

/// An unfinished routine being defined inside a module.
#[derive(Debug)]
pub struct RoutineBuilder<'m> {
    module: &'m DynamicModule,
    name: String,
    signature: RoutineSignature,
    body: Vec<Instr>,
}

impl<'m> RoutineBuilder<'m> {
    pub(crate) fn new(module: &'m DynamicModule, name: String, signature: RoutineSignature) -> Self {
        Self {
            module,
            name,
            signature,
            body: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &RoutineSignature {
        &self.signature
    }

    /// Instructions emitted so far.
    pub fn body(&self) -> &[Instr] {
        &self.body
    }

    /// Append one instruction.
    pub fn emit(&mut self, instr: Instr) -> &mut Self {
        self.body.push(instr);
        self
    }

    /// Append a sequence of instructions.
    pub fn emit_all(&mut self, instrs: impl IntoIterator<Item = Instr>) -> &mut Self {
        self.body.extend(instrs);
        self
    }

    /// Verify the body and publish the routine into its module.
    ///
    /// Fails if verification fails or if another routine with the same name was
    /// finished first.
    pub fn finish(self) -> RoutineResult<Arc<Routine>> {
        verify_body(&self.name, &self.signature, &self.body)?;
        self.module.publish(self.name, self.signature, self.body)
    }
}
