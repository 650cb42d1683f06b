//! # Instruction effect functions
//!
//! Every instruction becomes a function over the hardware model's core and
//! memory state. The body performs the register and memory effects of the
//! instruction and ends with the instruction cache access of its own address,
//! whose hit or miss result is returned. Control transfer is modeled by the
//! net, so branches, returns and writes to `pc` only access the cache.

use crate::isa::{
    registers_of, AluOp, Extend, Instruction, Operand, Operation, Register, Shift, Width, LR, PC,
    SP,
};
use crate::program::Program;
use std::fmt::Write;

//
// Public Interface
//

/// Render the effect function of a single instruction.
pub fn emit_function(instruction: &Instruction) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "int inst{:x}(core_t &core, mem_t &mem) {{ // {}",
        instruction.address, instruction
    );
    for statement in effect(instruction) {
        let _ = writeln!(out, "  {}", statement);
    }
    let _ = writeln!(
        out,
        "  return cacheAccess(core.ICache, {});",
        instruction.address
    );
    let _ = writeln!(out, "}}");
    let _ = writeln!(out);

    out
}

/// Effect functions of all instructions in trace order.
pub fn emit_functions(program: &Program) -> String {
    program
        .instructions()
        .iter()
        .map(emit_function)
        .collect()
}

/// Memory access counts of all instructions in trace order, as consumed by
/// the declarations of the hardware model.
pub fn emit_program_data(program: &Program) -> String {
    let counts: Vec<String> = program
        .instructions()
        .iter()
        .map(|instruction| instruction.memory_access_count().to_string())
        .collect();

    format!("const program_t prog = {{\n{}\n}};\n\n", counts.join(", "))
}

//
// Private Implementation
//

/// Value of a register as seen by the executing instruction.
fn read(register: Register, address: u32) -> String {
    if register == PC {
        address.wrapping_add(4).to_string()
    } else {
        format!("core.regs.r[{}]", register)
    }
}

fn operand(operand: Operand, address: u32) -> String {
    match operand {
        Operand::Register(register) => read(register, address),
        Operand::Immediate(imm) => imm.to_string(),
    }
}

fn write(register: Register, value: impl AsRef<str>) -> Vec<String> {
    if register == PC {
        return Vec::new();
    }
    vec![format!("core.regs.r[{}] = {};", register, value.as_ref())]
}

/// Flag-setting addition or subtraction, the result is discarded for `None`.
fn arithmetic(rd: Option<Register>, a: &str, b: &str, subtract: bool) -> Vec<String> {
    let mut statements = Vec::new();

    if subtract {
        let inverted = format!("(uint32_t)~({})", b);
        statements.push(format!("uint64_t val = (uint64_t){} + {} + 1;", a, inverted));
        statements.push(format!("updateSR(core.regs, val, {}, {});", a, inverted));
    } else {
        statements.push(format!("uint64_t val = (uint64_t){} + {};", a, b));
        statements.push(format!("updateSR(core.regs, val, {}, {});", a, b));
    }

    if let Some(rd) = rd {
        statements.extend(write(rd, "(uint32_t)val"));
    }

    statements
}

/// Result with N and Z taken from the value and C cleared.
fn logical(rd: Register, value: impl AsRef<str>) -> Vec<String> {
    let mut statements = write(rd, value);
    if rd != PC {
        statements.push(format!(
            "updateSR(core.regs, core.regs.r[{0}], core.regs.r[{0}], 0);",
            rd
        ));
    }
    statements
}

fn memory_read(width: Width) -> &'static str {
    match width {
        Width::Word => "memRead",
        Width::Halfword => "memRead16",
        Width::Byte => "memRead8",
    }
}

fn memory_write(width: Width) -> &'static str {
    match width {
        Width::Word => "memWrite",
        Width::Halfword => "memWrite16",
        Width::Byte => "memWrite8",
    }
}

/// Transfer a register list to or from consecutive words above `base`.
fn transfer(load: bool, registers: u16) -> Vec<String> {
    registers_of(registers)
        .enumerate()
        .flat_map(|(slot, register)| {
            let location = format!("base + {}", slot * 4);
            if !load {
                vec![format!("memWrite(mem, {}, core.regs.r[{}]);", location, register)]
            } else if register == PC {
                vec![format!("memRead(mem, {});", location)]
            } else {
                write(register, format!("memRead(mem, {})", location))
            }
        })
        .collect()
}

#[rustfmt::skip]
fn effect(instruction: &Instruction) -> Vec<String> {
    let address = instruction.address;
    let r = |register: &Register| read(*register, address);

    match &instruction.operation {
        Operation::MoveImmediate { rd, imm } =>
            logical(*rd, imm.to_string()),
        Operation::MoveRegister { rd, rm, set_flags: true } =>
            logical(*rd, r(rm)),
        Operation::MoveRegister { rd, rm, .. } if rd == rm =>
            Vec::new(),
        Operation::MoveRegister { rd, rm, .. } =>
            write(*rd, r(rm)),
        Operation::Shift { op, rd, rm, amount } => {
            let value = match (op, amount) {
                (Shift::Lsl, n) => format!("{} << {}", r(rm), n),
                (Shift::Lsr, 32) => String::from("0"),
                (Shift::Lsr, n) => format!("{} >> {}", r(rm), n),
                (Shift::Asr, n) => format!("(uint32_t)((int32_t){} >> {})", r(rm), (*n).min(31)),
            };
            logical(*rd, value)
        }
        Operation::AddSubtract { rd, rn, operand: value, subtract } =>
            arithmetic(Some(*rd), &r(rn), &operand(*value, address), *subtract),
        Operation::AddSubtractImmediate { rdn, imm, subtract } =>
            arithmetic(Some(*rdn), &r(rdn), &imm.to_string(), *subtract),
        Operation::AddHigh { rdn, rm } =>
            write(*rdn, format!("{} + {}", r(rdn), r(rm))),
        Operation::Compare { rn, operand: value } =>
            arithmetic(None, &r(rn), &operand(*value, address), true),
        Operation::Alu { op: AluOp::Neg, rdn, rm } =>
            arithmetic(Some(*rdn), "0", &r(rm), true),
        Operation::Alu { op: AluOp::Tst, rdn, rm } => vec![
            format!("uint32_t val = {} & {};", r(rdn), r(rm)),
            String::from("updateSR(core.regs, val, val, 0);"),
        ],
        Operation::Alu { op, rdn, rm } => {
            let (a, b) = (r(rdn), r(rm));
            let value = match op {
                AluOp::And => format!("{} & {}", a, b),
                AluOp::Eor => format!("{} ^ {}", a, b),
                AluOp::Orr => format!("{} | {}", a, b),
                AluOp::Bic => format!("{} & ~{}", a, b),
                AluOp::Mvn => format!("~{}", b),
                AluOp::Mul => format!("{} * {}", a, b),
                AluOp::Tst | AluOp::Neg => unreachable!(),
            };
            logical(*rdn, value)
        }
        Operation::Extend { op, rd, rm } => {
            let value = match op {
                Extend::Sxth => format!("(uint32_t)(int32_t)(int16_t){}", r(rm)),
                Extend::Sxtb => format!("(uint32_t)(int32_t)(int8_t){}", r(rm)),
                Extend::Uxth => format!("{} & 0xffff", r(rm)),
                Extend::Uxtb => format!("{} & 0xff", r(rm)),
            };
            write(*rd, value)
        }
        Operation::ConditionalBranch { .. }
        | Operation::Branch { .. }
        | Operation::BranchExchange { .. }
        | Operation::Nop => Vec::new(),
        Operation::Call { .. } =>
            write(LR, (address.wrapping_add(4) | 1).to_string()),
        Operation::CallExchange { .. } =>
            write(LR, (address.wrapping_add(2) | 1).to_string()),
        Operation::LoadLiteral { rt, value, .. } =>
            write(*rt, format!("{:#x}", value.unwrap_or(0))),
        Operation::LoadStore { load, width, rt, rn, offset } => {
            let location = format!("{} + {}", r(rn), operand(*offset, address));
            if *load {
                write(*rt, format!("{}(mem, {})", memory_read(*width), location))
            } else {
                vec![format!("{}(mem, {}, {});", memory_write(*width), location, r(rt))]
            }
        }
        Operation::LoadStoreMultiple { load, rn, registers } => {
            let mut statements = vec![format!("uint32_t base = {};", r(rn))];
            statements.extend(transfer(*load, *registers));
            // a loaded base register is not written back
            if !(*load && *registers & (1u16 << *rn) != 0) {
                statements.extend(write(*rn, format!("base + {}", registers.count_ones() * 4)));
            }
            statements
        }
        Operation::Push { registers } => {
            let mut statements = vec![format!("uint32_t base = {} - {};", r(&SP), registers.count_ones() * 4)];
            statements.extend(transfer(false, *registers));
            statements.extend(write(SP, "base"));
            statements
        }
        Operation::Pop { registers } => {
            let mut statements = vec![format!("uint32_t base = {};", r(&SP))];
            statements.extend(transfer(true, *registers));
            statements.extend(write(SP, format!("base + {}", registers.count_ones() * 4)));
            statements
        }
        Operation::AdjustStack { imm, subtract } =>
            write(SP, format!("{} {} {}", r(&SP), if *subtract { "-" } else { "+" }, imm)),
        Operation::AddressOf { rd, base: PC, imm } =>
            write(*rd, (address.wrapping_add(4) & !3).wrapping_add(*imm).to_string()),
        Operation::AddressOf { rd, base, imm } =>
            write(*rd, format!("{} + {}", r(base), imm)),
        Operation::Multiply { rd, rn, rm } =>
            write(*rd, format!("{} * {}", r(rn), r(rm))),
        Operation::SignedDivide { rd, rn, rm } =>
            write(*rd, format!("{1} == 0 ? 0 : (uint32_t)((int32_t){0} / (int32_t){1})", r(rn), r(rm))),
        Operation::AddWide { rd, rn, imm, set_flags: true } =>
            arithmetic(Some(*rd), &r(rn), &imm.to_string(), false),
        Operation::AddWide { rd, rn, imm, .. } =>
            write(*rd, format!("{} + {}", r(rn), imm)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{decode_arm32, decode_thumb};

    fn function(address: u32, code: u16) -> String {
        emit_function(&decode_thumb(address, code).unwrap())
    }

    #[test]
    fn move_immediate_sets_register_and_flags() {
        assert_eq!(
            function(0x8000, 0x2005),
            "int inst8000(core_t &core, mem_t &mem) { // 8000: movs r0, #5\n\
             \x20 core.regs.r[0] = 5;\n\
             \x20 updateSR(core.regs, core.regs.r[0], core.regs.r[0], 0);\n\
             \x20 return cacheAccess(core.ICache, 32768);\n\
             }\n\n"
        );
    }

    #[test]
    fn compare_only_updates_flags() {
        let text = function(0x8008, 0x2805);

        assert!(text.contains(
            "  uint64_t val = (uint64_t)core.regs.r[0] + (uint32_t)~(5) + 1;\n"
        ));
        assert!(text.contains("  updateSR(core.regs, val, core.regs.r[0], (uint32_t)~(5));\n"));
        assert!(!text.contains("core.regs.r[0] ="));
    }

    #[test]
    fn branches_only_access_the_cache() {
        assert_eq!(
            function(0x8002, 0xd001),
            "int inst8002(core_t &core, mem_t &mem) { // 8002: beq.n 8008\n\
             \x20 return cacheAccess(core.ICache, 32770);\n\
             }\n\n"
        );
    }

    #[test]
    fn push_stores_below_stack_pointer() {
        let text = function(0x8000, 0xb580);

        assert!(text.contains("  uint32_t base = core.regs.r[13] - 8;\n"));
        assert!(text.contains("  memWrite(mem, base + 0, core.regs.r[7]);\n"));
        assert!(text.contains("  memWrite(mem, base + 4, core.regs.r[14]);\n"));
        assert!(text.contains("  core.regs.r[13] = base;\n"));
    }

    #[test]
    fn pop_with_pc_reads_but_does_not_write_pc() {
        let text = function(0x800e, 0xbd80);

        assert!(text.contains("  core.regs.r[7] = memRead(mem, base + 0);\n"));
        assert!(text.contains("  memRead(mem, base + 4);\n"));
        assert!(!text.contains("core.regs.r[15]"));
        assert!(text.contains("  core.regs.r[13] = base + 8;\n"));
    }

    #[test]
    fn call_sets_link_register() {
        let text = emit_function(&decode_arm32(0x8004, 0xf000_f804).unwrap());

        assert!(text.contains("  core.regs.r[14] = 32777;\n"));
    }

    #[test]
    fn literal_load_uses_pool_value_or_zero() {
        let mut instruction = decode_thumb(0x8000, 0x4801).unwrap();
        assert!(emit_function(&instruction).contains("  core.regs.r[0] = 0x0;\n"));

        instruction.operation = Operation::LoadLiteral {
            rt: 0,
            imm8: 1,
            value: Some(0x2000_0000),
        };
        assert!(emit_function(&instruction).contains("  core.regs.r[0] = 0x20000000;\n"));
    }

    #[test]
    fn byte_load_uses_byte_accessor() {
        let text = function(0x8000, 0x5cd3);

        assert!(text.contains("  core.regs.r[3] = memRead8(mem, core.regs.r[2] + core.regs.r[3]);\n"));
    }

    #[test]
    fn program_data_lists_access_counts() {
        use crate::trace::{RecordKind, TraceRecord};
        use crate::isa::InstructionSet;

        let records: Vec<_> = [(0x8000, 0xb580), (0x8002, 0x2005), (0x8004, 0x6818)]
            .iter()
            .map(|&(address, code)| TraceRecord {
                kind: RecordKind::Instruction(InstructionSet::Thumb),
                address,
                code,
            })
            .collect();
        let program = Program::from_trace(&records);

        assert_eq!(
            emit_program_data(&program),
            "const program_t prog = {\n2, 0, 1\n};\n\n"
        );
    }
}
