//! # Timed Petri net of a program
//!
//! Every reachable instruction becomes a place holding the program counter
//! token and a transition that fires the instruction once the fetch
//! arbitration of its core allows it. Conditional branches get a second,
//! taken transition guarded by their condition. The net is built as plain
//! data here and serialized by [`xml::write_net`].

use crate::cfg::ControlFlowError;
use crate::isa::Instruction;
use crate::program::Program;
use log::{debug, trace};
use std::collections::{BTreeSet, HashSet};

pub mod xml;

pub use xml::{write_net, Project};

//
// Public Interface
//

#[derive(Clone, Debug, PartialEq)]
pub struct Net {
    pub places: Vec<Place>,
    pub arcs: Vec<Arc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Place {
    pub id: u32,
    pub address: u32,
    /// Call nesting at which the place was first reached, used for layout.
    pub depth: usize,
    pub initial_marking: u32,
    pub transitions: Vec<Transition>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Plain,
    NotTaken,
    Taken,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub id: u32,
    pub address: u32,
    pub kind: TransitionKind,
    pub guard: String,
    pub update: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArcKind {
    PlaceTransition,
    TransitionPlace,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Arc {
    pub place: u32,
    pub transition: u32,
    pub kind: ArcKind,
    pub nail: (f32, f32),
}

#[derive(Clone, Debug)]
pub struct NetOptions {
    pub entry: u32,
    pub stop_addresses: BTreeSet<u32>,
    pub max_call_depth: usize,
    pub core: String,
    pub mark_entry: bool,
}

impl TransitionKind {
    pub fn suffix(self) -> &'static str {
        match self {
            TransitionKind::Plain => "",
            TransitionKind::NotTaken => "_NT",
            TransitionKind::Taken => "_T",
        }
    }
}

impl Net {
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.places.iter().flat_map(|place| place.transitions.iter())
    }

    pub fn place(&self, address: u32) -> Option<&Place> {
        self.places.iter().find(|place| place.address == address)
    }

    pub fn transition(&self, address: u32, kind: TransitionKind) -> Option<&Transition> {
        self.transitions()
            .find(|transition| transition.address == address && transition.kind == kind)
    }

    /// Places a transition leads to.
    pub fn outputs(&self, transition: u32) -> Vec<u32> {
        self.arcs
            .iter()
            .filter(|arc| arc.kind == ArcKind::TransitionPlace && arc.transition == transition)
            .map(|arc| arc.place)
            .collect()
    }
}

/// Build the net reachable from the entry address of a resolved program.
pub fn build_net(program: &Program, options: &NetOptions) -> Result<Net, ControlFlowError> {
    let mut builder = NetBuilder {
        program,
        options,
        emitted: vec![false; program.len()],
        places: Vec::new(),
    };

    builder.walk(options.entry, 0)?;

    if options.mark_entry {
        if let Some(place) = builder.places.first_mut() {
            place.initial_marking = 1;
        }
    }

    let arcs = builder.arcs();
    let net = Net {
        places: builder.places,
        arcs,
    };

    debug!(
        "net has {} places, {} transitions and {} arcs",
        net.places.len(),
        net.transitions().count(),
        net.arcs.len()
    );

    Ok(net)
}

//
// Private Implementation
//

const BRANCH_NAIL_X: f32 = 500.0;
const RETURN_NAIL_X: f32 = 100.0;
const NAIL_OFFSET_Y: f32 = 536.0;
const ROW_HEIGHT: f32 = 90.0;

struct NetBuilder<'a> {
    program: &'a Program,
    options: &'a NetOptions,
    emitted: Vec<bool>,
    places: Vec<Place>,
}

impl<'a> NetBuilder<'a> {
    fn walk(&mut self, start: u32, depth: usize) -> Result<(), ControlFlowError> {
        if depth > self.options.max_call_depth {
            return Err(ControlFlowError::CallDepthExceeded {
                address: start,
                limit: self.options.max_call_depth,
            });
        }

        let program = self.program;

        for (index, instruction) in program.instructions().iter().enumerate() {
            if instruction.address < start {
                continue;
            }

            let fresh = !self.emitted[index];
            if fresh {
                self.emitted[index] = true;
                let place = self.place(instruction, depth);
                self.places.push(place);
            }

            let stop = self.options.stop_addresses.contains(&instruction.address);

            if let (true, Some(target)) = (instruction.is_call(), instruction.branch_address()) {
                if program.index_of(target).is_none() {
                    return Err(ControlFlowError::UnresolvedCallTarget {
                        call: instruction.address,
                        target,
                    });
                }
                if fresh && !stop {
                    self.walk(target, depth + 1)?;
                }
            }

            if stop {
                trace!("walk from {:#x} stops at {:#x}", start, instruction.address);
                break;
            }
        }

        Ok(())
    }

    fn place(&self, instruction: &Instruction, depth: usize) -> Place {
        let core = &self.options.core;
        let fetch = format!("doFetch[{}] #eqeq 1", core);

        let transitions = match (instruction.guard(core), instruction.transition_id_taken) {
            (Some(condition), Some(taken_id)) => vec![
                self.transition(
                    instruction,
                    instruction.transition_id,
                    TransitionKind::NotTaken,
                    format!("!({}) && {}", condition, fetch),
                ),
                self.transition(
                    instruction,
                    taken_id,
                    TransitionKind::Taken,
                    format!("{} && {}", condition, fetch),
                ),
            ],
            _ => vec![self.transition(
                instruction,
                instruction.transition_id,
                TransitionKind::Plain,
                fetch,
            )],
        };

        Place {
            id: instruction.place_id,
            address: instruction.address,
            depth,
            initial_marking: 0,
            transitions,
        }
    }

    fn transition(
        &self,
        instruction: &Instruction,
        id: u32,
        kind: TransitionKind,
        guard: String,
    ) -> Transition {
        let core = &self.options.core;

        Transition {
            id,
            address: instruction.address,
            kind,
            guard,
            update: format!(
                "isHit[{0}] = inst{1:x}(st[{0}],mem[{0}]);\ndoFetch[{0}] = 0;\nac[{0}] = {2};",
                core,
                instruction.address,
                instruction.memory_access_count()
            ),
        }
    }

    /// Arcs of all emitted instructions in trace order.
    fn arcs(&self) -> Vec<Arc> {
        let instructions = self.program.instructions();
        let emitted: HashSet<u32> = self.places.iter().map(|place| place.id).collect();
        let mut arcs = Vec::new();

        let down = |arcs: &mut Vec<Arc>, place: Option<u32>, transition: u32, nail: (f32, f32)| {
            if let Some(place) = place.filter(|id| emitted.contains(id)) {
                arcs.push(Arc {
                    place,
                    transition,
                    kind: ArcKind::TransitionPlace,
                    nail,
                });
            }
        };

        for (index, instruction) in instructions.iter().enumerate() {
            if !self.emitted[index] {
                continue;
            }

            let place = instruction.place_id;
            let transition = instruction.transition_id;
            let successor = instructions.get(index + 1).map(|next| next.place_id);
            let row = ROW_HEIGHT * place as f32;

            let up = |transition| Arc {
                place,
                transition,
                kind: ArcKind::PlaceTransition,
                nail: (0.0, 0.0),
            };

            arcs.push(up(transition));

            if let Some(taken) = instruction.transition_id_taken {
                arcs.push(up(taken));
                down(&mut arcs, successor, transition, (0.0, 0.0));
                down(&mut arcs, instruction.target_id_taken, taken, (0.0, 0.0));
            } else if instruction.is_unconditional_branch() || instruction.is_call() {
                let nail = (BRANCH_NAIL_X, row + NAIL_OFFSET_Y);
                down(&mut arcs, instruction.target_id_taken, transition, nail);
            } else if instruction.is_return() {
                let nail = (RETURN_NAIL_X, row - NAIL_OFFSET_Y);
                down(&mut arcs, instruction.target_id_taken, transition, nail);
            } else {
                down(&mut arcs, successor, transition, (0.0, 0.0));
            }
        }

        arcs
    }
}
