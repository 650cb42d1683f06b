//! # Program arena
//!
//! Instructions are kept in trace order, which is load-bearing: the
//! fall-through successor of an instruction is the next element. Other
//! passes refer to instructions by index or address only.

use crate::isa::{decode, Instruction, Operation};
use crate::trace::{RecordKind, TraceRecord};
use log::{debug, trace, warn};
use std::collections::HashMap;
use thiserror::Error;

//
// Public Interface
//

/// Data word embedded in the instruction stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InlineWord {
    pub address: u32,
    pub value: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("literal load at {address:#x} reads {target:#x} which is not part of the trace")]
    Unresolved { address: u32, target: u32 },
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    words: Vec<InlineWord>,
    index: HashMap<u32, usize>,
}

impl Program {
    /// Decode the instruction records of a trace and collect its inline words.
    pub fn from_trace(records: &[TraceRecord]) -> Self {
        let mut program = Program::default();

        for record in records {
            match record.kind {
                RecordKind::Word => program.words.push(InlineWord {
                    address: record.address,
                    value: record.code,
                }),
                RecordKind::Instruction(isa) => match decode(record.address, record.code, isa) {
                    Ok(instruction) => program.push(instruction),
                    Err(error) => warn!("skipping instruction: {}", error),
                },
            }
        }

        debug!(
            "decoded {} instructions and {} inline words",
            program.instructions.len(),
            program.words.len()
        );

        program
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instructions_mut(&mut self) -> &mut [Instruction] {
        &mut self.instructions
    }

    pub fn words(&self) -> &[InlineWord] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn index_of(&self, address: u32) -> Option<usize> {
        self.index.get(&address).copied()
    }

    pub fn get(&self, address: u32) -> Option<&Instruction> {
        self.index_of(address).map(|i| &self.instructions[i])
    }

    pub fn place_id_of(&self, address: u32) -> Option<u32> {
        self.get(address).map(|instruction| instruction.place_id)
    }

    /// Index of the first instruction at or after `address` in trace order.
    pub fn first_at_or_after(&self, address: u32) -> Option<usize> {
        self.instructions
            .iter()
            .position(|instruction| instruction.address >= address)
    }

    /// Store the pool value on every PC-relative load, reporting loads whose
    /// pool entry is missing from the trace.
    pub fn resolve_literals(&mut self) -> Vec<LiteralError> {
        let pool: HashMap<u32, u32> = self
            .words
            .iter()
            .map(|word| (word.address, word.value))
            .collect();

        let mut unresolved = Vec::new();

        for instruction in self.instructions.iter_mut() {
            let target = match instruction.literal_address() {
                Some(target) => target,
                None => continue,
            };

            if let Operation::LoadLiteral { value, .. } = &mut instruction.operation {
                *value = pool.get(&target).copied();

                match value {
                    Some(v) => trace!("literal at {:x} resolved to {:#x}", target, v),
                    None => unresolved.push(LiteralError::Unresolved {
                        address: instruction.address,
                        target,
                    }),
                }
            }
        }

        unresolved
    }

    /// Assign dense place and transition identifiers in trace order.
    pub fn allocate_ids(&mut self) {
        let mut place_id = 1;
        let mut transition_id = 1;

        for instruction in self.instructions.iter_mut() {
            instruction.place_id = place_id;
            place_id += 1;

            instruction.transition_id = transition_id;
            transition_id += 1;

            if instruction.is_conditional_branch() {
                instruction.transition_id_taken = Some(transition_id);
                transition_id += 1;
            }
        }
    }

    pub fn conditional_branch_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|instruction| instruction.is_conditional_branch())
            .count()
    }

    pub fn reachable(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|instruction| instruction.reachable)
    }
}

//
// Private Implementation
//

impl Program {
    fn push(&mut self, instruction: Instruction) {
        if self.index.contains_key(&instruction.address) {
            warn!(
                "skipping duplicate instruction at {:#x}",
                instruction.address
            );
            return;
        }

        self.index
            .insert(instruction.address, self.instructions.len());
        self.instructions.push(instruction);
    }
}
