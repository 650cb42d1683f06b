//! # Extraction pipeline
//!
//! Composes the passes: trace reading, decoding, literal resolution,
//! identifier allocation, control flow resolution and the two emitters.
//! Nothing is written here; the caller decides where the artifacts go so
//! that a failing run leaves no partial output behind.

use crate::cfg::resolve_control_flow;
use crate::petri::{build_net, Net, NetOptions};
use crate::program::Program;
use crate::pseudocode::{emit_functions, emit_program_data};
use crate::trace::parse_trace;
use anyhow::{bail, ensure, Context, Result};
use log::{debug, info, warn};
use std::io::BufRead;

pub mod defaults {
    pub const ENTRY_ADDRESS: u32 = 0x8000;
    pub const MAX_CALL_DEPTH: usize = 64;
    pub const CORE: &str = "$any";
    pub const OUTPUT: &str = "program.xml";
}

#[derive(Clone, Debug)]
pub struct ExtractOptions {
    pub entry: u32,
    pub stop_addresses: Vec<u32>,
    pub max_call_depth: usize,
    pub strict_literals: bool,
    pub core: String,
    pub mark_entry: bool,
    pub program_data: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            entry: defaults::ENTRY_ADDRESS,
            stop_addresses: Vec::new(),
            max_call_depth: defaults::MAX_CALL_DEPTH,
            strict_literals: false,
            core: String::from(defaults::CORE),
            mark_entry: false,
            program_data: false,
        }
    }
}

/// Artifacts of a successful extraction.
#[derive(Debug)]
pub struct Extraction {
    pub program: Program,
    pub net: Net,
    /// Effect functions of all decoded instructions, in trace order.
    pub functions: String,
    pub program_data: Option<String>,
}

impl Extraction {
    /// Reachability property that yields the execution times up to the last
    /// stop address.
    pub fn query(&self, options: &ExtractOptions) -> Option<String> {
        options
            .stop_addresses
            .last()
            .map(|stop| format!("EF[p,p](INST{:x}[0]>0)", stop))
    }
}

pub fn extract<R: BufRead>(input: R, options: &ExtractOptions) -> Result<Extraction> {
    ensure!(
        !options.stop_addresses.is_empty(),
        "at least one stop address is required"
    );

    let records = time_debug!("reading trace", {
        parse_trace(input).context("failed to parse trace")?
    });

    let mut program = time_debug!("decoding", { Program::from_trace(&records) });

    for error in program.resolve_literals() {
        if options.strict_literals {
            bail!(error);
        }
        warn!("{}, using 0", error);
    }

    program.allocate_ids();

    time_info!("resolving control flow", {
        resolve_control_flow(&mut program, options.entry, options.max_call_depth)
            .context("failed to resolve control flow")?
    });

    for instruction in program.reachable() {
        match instruction.target_id_taken {
            Some(target) => debug!("({}) {} -> {}", instruction.place_id, instruction, target),
            None => debug!("({}) {}", instruction.place_id, instruction),
        }
    }

    let net_options = NetOptions {
        entry: options.entry,
        stop_addresses: options.stop_addresses.iter().copied().collect(),
        max_call_depth: options.max_call_depth,
        core: options.core.clone(),
        mark_entry: options.mark_entry,
    };

    let net = time_info!("building net", {
        build_net(&program, &net_options).context("failed to build net")?
    });

    let functions = emit_functions(&program);
    let program_data = if options.program_data {
        Some(emit_program_data(&program))
    } else {
        None
    };

    info!(
        "extracted {} instructions into {} places",
        program.len(),
        net.places.len()
    );

    Ok(Extraction {
        program,
        net,
        functions,
        program_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(stops: &[u32]) -> ExtractOptions {
        ExtractOptions {
            stop_addresses: stops.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn requires_a_stop_address() {
        assert!(extract("t:8000:2005\n".as_bytes(), &options(&[])).is_err());
    }

    #[test]
    fn unresolved_literal_is_fatal_only_when_strict() {
        let trace = "t:8000:4801\nt:8002:2000\n";

        assert!(extract(trace.as_bytes(), &options(&[0x8002])).is_ok());

        let strict = ExtractOptions {
            strict_literals: true,
            ..options(&[0x8002])
        };
        let error = extract(trace.as_bytes(), &strict).unwrap_err();
        assert!(error.to_string().contains("8006"));
    }

    #[test]
    fn program_data_is_optional() {
        let trace = "t:8000:2005\n";
        let with_data = ExtractOptions {
            program_data: true,
            ..options(&[0x8000])
        };

        assert!(extract(trace.as_bytes(), &options(&[0x8000]))
            .unwrap()
            .program_data
            .is_none());
        assert_eq!(
            extract(trace.as_bytes(), &with_data).unwrap().program_data,
            Some(String::from("const program_t prog = {\n0\n};\n\n"))
        );
    }

    #[test]
    fn query_names_the_last_stop_address() {
        let options = options(&[0x8000, 0x800e]);
        let extraction = extract("t:8000:2005\n".as_bytes(), &options).unwrap();

        assert_eq!(
            extraction.query(&options),
            Some(String::from("EF[p,p](INST800e[0]>0)"))
        );
    }
}
