//! Interrupt vector table
//!
//! A fixed array of [`VECTOR_COUNT`] slots. A slot starts empty and gets a
//! hook list on its first registration; hooks are only ever appended, run in
//! insertion order, and an identical (handler, parameter) pair is stored
//! once.
//!
//! The table itself needs no heap: only a slot's hook list does, and only
//! once something hooks that vector.

use alloc::vec::Vec;

use super::CpuState;
use crate::config::VECTOR_COUNT;
use crate::error::{KernelError, Result};

/// Hook entry point: CPU state, the hook's parameter and the vector number
pub type InterruptHandler = fn(&mut CpuState, usize, u32);

/// A registered handler with its opaque parameter
#[derive(Clone, Copy)]
pub struct InterruptHook {
    pub handler: InterruptHandler,
    pub param: usize,
}

impl InterruptHook {
    pub const fn new(handler: InterruptHandler, param: usize) -> Self {
        Self { handler, param }
    }
}

// Identity is the handler's address plus the parameter
impl PartialEq for InterruptHook {
    fn eq(&self, other: &Self) -> bool {
        self.handler as usize == other.handler as usize && self.param == other.param
    }
}

impl Eq for InterruptHook {}

impl core::fmt::Debug for InterruptHook {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterruptHook")
            .field("handler", &format_args!("{:#x}", self.handler as usize))
            .field("param", &format_args!("{:#x}", self.param))
            .finish()
    }
}

pub struct VectorTable {
    slots: [Option<Vec<InterruptHook>>; VECTOR_COUNT],
}

impl Default for VectorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorTable {
    /// An all-empty table
    pub const fn new() -> Self {
        const EMPTY: Option<Vec<InterruptHook>> = None;
        Self {
            slots: [EMPTY; VECTOR_COUNT],
        }
    }

    /// Append `hook` to `vector` unless the same pair is already there
    ///
    /// Returns whether the hook was added.
    pub fn hook(&mut self, vector: u32, hook: InterruptHook) -> Result<bool> {
        let slot = self
            .slots
            .get_mut(vector as usize)
            .ok_or(KernelError::InvalidVector(vector))?;

        let hooks = slot.get_or_insert_with(Vec::new);
        if hooks.contains(&hook) {
            return Ok(false);
        }
        hooks.push(hook);
        Ok(true)
    }

    /// Hooks registered for `vector`, in insertion order
    pub fn hooks(&self, vector: u32) -> &[InterruptHook] {
        match self.slots.get(vector as usize) {
            Some(Some(hooks)) => hooks,
            _ => &[],
        }
    }

    /// Whether anything was ever registered for `vector`
    pub fn is_registered(&self, vector: u32) -> bool {
        matches!(self.slots.get(vector as usize), Some(Some(_)))
    }

    /// Run every hook of `vector` in order; returns how many ran
    pub fn dispatch(&self, vector: u32, state: &mut CpuState) -> usize {
        let hooks = self.hooks(vector);
        for hook in hooks {
            (hook.handler)(state, hook.param, vector);
        }
        hooks.len()
    }
}
