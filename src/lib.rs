#[macro_use]
pub mod util;

pub mod cfg;
pub mod isa;
pub mod petri;
pub mod pipeline;
pub mod program;
pub mod pseudocode;
pub mod trace;
