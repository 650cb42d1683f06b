//! # Resolve control flow of a program
//!
//! Walks the program from an entry address and assigns the place id of the
//! destination to every branch, call and return it reaches. Calls are
//! unrolled recursively: the callee is walked with the place id of the
//! instruction following the call as the destination of its return.
//!
//! The net has no call stack. A callee reached from several call sites keeps
//! the return destination of the first site that resolved it.

use crate::program::Program;
use log::{debug, trace, warn};
use thiserror::Error;

//
// Public Interface
//

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ControlFlowError {
    #[error("call at {call:#x} targets {target:#x} which is not part of the trace")]
    UnresolvedCallTarget { call: u32, target: u32 },

    #[error("call nesting exceeds {limit} at {address:#x}")]
    CallDepthExceeded { address: u32, limit: usize },
}

/// Resolve target ids and reachability of all instructions visited from
/// `entry`.
pub fn resolve_control_flow(
    program: &mut Program,
    entry: u32,
    max_depth: usize,
) -> Result<(), ControlFlowError> {
    let mut resolver = Resolver { program, max_depth };

    resolver.resolve(entry, None, 0)?;

    debug!(
        "{} of {} instructions reachable from {:#x}",
        resolver.program.reachable().count(),
        resolver.program.len(),
        entry
    );

    Ok(())
}

//
// Private Implementation
//

struct Resolver<'a> {
    program: &'a mut Program,
    max_depth: usize,
}

impl<'a> Resolver<'a> {
    fn resolve(
        &mut self,
        start: u32,
        return_id: Option<u32>,
        depth: usize,
    ) -> Result<(), ControlFlowError> {
        if depth > self.max_depth {
            return Err(ControlFlowError::CallDepthExceeded {
                address: start,
                limit: self.max_depth,
            });
        }

        trace!("resolving from {:#x} at depth {}", start, depth);

        for index in 0..self.program.len() {
            let instruction = &self.program.instructions()[index];

            if instruction.address < start {
                continue;
            }

            if let Some(target) = instruction.target_id_taken {
                if instruction.is_return() {
                    if return_id.is_some() && return_id != Some(target) {
                        warn!(
                            "return at {:#x} already leads to place {}, ignoring call site returning to {:?}",
                            instruction.address, target, return_id
                        );
                    }
                    break;
                }
                continue;
            }

            let address = instruction.address;
            let is_return = instruction.is_return();
            let is_call = instruction.is_call();
            let branch = instruction.branch_address();

            let target_id = if is_return {
                if return_id.is_none() {
                    warn!("return at {:#x} outside of any call", address);
                }
                return_id
            } else if let Some(destination) = branch {
                let target_id = self.program.place_id_of(destination);
                match target_id {
                    None if is_call => {
                        return Err(ControlFlowError::UnresolvedCallTarget {
                            call: address,
                            target: destination,
                        })
                    }
                    None => warn!(
                        "branch at {:#x} targets {:#x} which is not part of the trace",
                        address, destination
                    ),
                    Some(_) => {}
                }
                target_id
            } else {
                None
            };

            let instruction = &mut self.program.instructions_mut()[index];
            instruction.reachable = true;
            instruction.target_id_taken = target_id;

            if is_return {
                break;
            }

            if let (true, Some(callee)) = (is_call, branch) {
                let successor = self
                    .program
                    .instructions()
                    .get(index + 1)
                    .map(|next| next.place_id);
                self.resolve(callee, successor, depth + 1)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::InstructionSet;
    use crate::trace::{RecordKind, TraceRecord};

    fn record(isa: InstructionSet, address: u32, code: u32) -> TraceRecord {
        TraceRecord {
            kind: RecordKind::Instruction(isa),
            address,
            code,
        }
    }

    fn program(lines: &[(u32, u32)]) -> Program {
        let records: Vec<_> = lines
            .iter()
            .map(|&(address, code)| {
                let isa = if code > 0xffff {
                    InstructionSet::Arm32
                } else {
                    InstructionSet::Thumb
                };
                record(isa, address, code)
            })
            .collect();

        let mut program = Program::from_trace(&records);
        program.allocate_ids();
        program
    }

    fn targets(program: &Program) -> Vec<Option<u32>> {
        program
            .instructions()
            .iter()
            .map(|i| i.target_id_taken)
            .collect()
    }

    #[test]
    fn resolves_call_and_return() {
        let mut program = program(&[
            (0x8000, 0xb580),
            (0x8002, 0x2005),
            (0x8004, 0xf000_f804),
            (0x8008, 0x2805),
            (0x800a, 0xd000),
            (0x800c, 0x2000),
            (0x800e, 0xbd80),
            (0x8010, 0x3001),
            (0x8012, 0x4770),
        ]);

        resolve_control_flow(&mut program, 0x8000, 8).unwrap();

        assert_eq!(
            targets(&program),
            vec![None, None, Some(8), None, Some(7), None, None, None, Some(4)]
        );
        assert!(program.instructions().iter().all(|i| i.reachable));
    }

    #[test]
    fn missing_call_target_is_fatal() {
        let mut program = program(&[(0x8000, 0xf000_f804), (0x8004, 0x2000)]);

        assert_eq!(
            resolve_control_flow(&mut program, 0x8000, 8),
            Err(ControlFlowError::UnresolvedCallTarget {
                call: 0x8000,
                target: 0x800c
            })
        );
    }

    #[test]
    fn missing_branch_target_stays_unresolved() {
        let mut program = program(&[(0x8000, 0xe00e), (0x8002, 0x2000)]);

        resolve_control_flow(&mut program, 0x8000, 8).unwrap();

        assert_eq!(targets(&program), vec![None, None]);
        assert!(program.instructions()[0].reachable);
    }

    #[test]
    fn instructions_before_the_entry_are_not_reached() {
        let mut program = program(&[(0x7ffe, 0x2001), (0x8000, 0x2002)]);

        resolve_control_flow(&mut program, 0x8000, 8).unwrap();

        assert!(!program.instructions()[0].reachable);
        assert!(program.instructions()[1].reachable);
    }

    #[test]
    fn recursion_is_bounded_by_call_depth() {
        // mutual recursion ends once both call sites are resolved
        let mut program = program(&[
            (0x8000, 0xf000_f800),
            (0x8004, 0xf7ff_fffc),
            (0x8008, 0x4770),
        ]);

        assert!(resolve_control_flow(&mut program, 0x8000, 8).is_ok());

        let mut program = program_with_nested_calls(3);
        assert!(matches!(
            resolve_control_flow(&mut program, 0x8000, 2),
            Err(ControlFlowError::CallDepthExceeded { limit: 2, .. })
        ));
    }

    /// A chain of `levels` functions, each calling the next one.
    fn program_with_nested_calls(levels: u32) -> Program {
        let mut lines = Vec::new();
        for level in 0..levels {
            let address = 0x8000 + level * 6;
            // bl to the next function, which starts 6 bytes further
            lines.push((address, 0xf000_f801));
            lines.push((address + 4, 0x4770));
        }
        lines.push((0x8000 + levels * 6, 0x4770));
        program(&lines)
    }
}
