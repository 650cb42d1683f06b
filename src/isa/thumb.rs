use super::{
    bit, branch_target, field, sign_extend, unsupported, AluOp, Condition, DecodeError, Extend,
    Instruction, Operand, Operation, Shift, Width, PC, SP,
};

/// Decode a 16-bit instruction, dispatching on bits[15:13].
pub fn decode_thumb(address: u32, code: u16) -> Result<Instruction, DecodeError> {
    let code = u32::from(code);

    let operation = match field(code, 13, 3) {
        0 => decode_shift_add_subtract(code),
        1 => decode_immediate(code),
        2 => decode_data_processing(address, code),
        3 => decode_load_store_immediate(code),
        4 => decode_load_store_halfword_or_stack(code),
        5 => decode_miscellaneous(address, code),
        6 => decode_multiple_or_conditional(address, code),
        _ => decode_branch(address, code),
    }?;

    Ok(Instruction::new(address, operation))
}

fn low(code: u32, lsb: u32) -> u8 {
    field(code, lsb, 3) as u8
}

fn decode_shift_add_subtract(code: u32) -> Result<Operation, DecodeError> {
    let rd = low(code, 0);
    let rm = low(code, 3);
    let imm5 = field(code, 6, 5) as u8;

    // lsr and asr encode a shift by 32 as zero
    let long_shift = if imm5 == 0 { 32 } else { imm5 };

    Ok(match field(code, 11, 2) {
        0 if imm5 == 0 => Operation::MoveRegister {
            rd,
            rm,
            set_flags: true,
        },
        0 => Operation::Shift {
            op: Shift::Lsl,
            rd,
            rm,
            amount: imm5,
        },
        1 => Operation::Shift {
            op: Shift::Lsr,
            rd,
            rm,
            amount: long_shift,
        },
        2 => Operation::Shift {
            op: Shift::Asr,
            rd,
            rm,
            amount: long_shift,
        },
        _ => {
            let value = field(code, 6, 3);
            Operation::AddSubtract {
                rd,
                rn: rm,
                operand: if bit(code, 10) {
                    Operand::Immediate(value)
                } else {
                    Operand::Register(value as u8)
                },
                subtract: bit(code, 9),
            }
        }
    })
}

fn decode_immediate(code: u32) -> Result<Operation, DecodeError> {
    let rdn = low(code, 8);
    let imm = field(code, 0, 8) as u8;

    Ok(match field(code, 11, 2) {
        0 => Operation::MoveImmediate { rd: rdn, imm },
        1 => Operation::Compare {
            rn: rdn,
            operand: Operand::Immediate(u32::from(imm)),
        },
        op => Operation::AddSubtractImmediate {
            rdn,
            imm,
            subtract: op == 3,
        },
    })
}

fn decode_data_processing(address: u32, code: u32) -> Result<Operation, DecodeError> {
    match field(code, 10, 3) {
        0b000 => decode_register_alu(address, code),
        0b001 => decode_special(address, code),
        0b010 | 0b011 => Ok(Operation::LoadLiteral {
            rt: low(code, 8),
            imm8: field(code, 0, 8) as u8,
            value: None,
        }),
        _ => decode_load_store_register(address, code),
    }
}

fn decode_register_alu(address: u32, code: u32) -> Result<Operation, DecodeError> {
    let rdn = low(code, 0);
    let rm = low(code, 3);

    let op = match field(code, 6, 4) {
        0 => AluOp::And,
        1 => AluOp::Eor,
        8 => AluOp::Tst,
        9 => AluOp::Neg,
        10 => {
            return Ok(Operation::Compare {
                rn: rdn,
                operand: Operand::Register(rm),
            })
        }
        12 => AluOp::Orr,
        13 => AluOp::Mul,
        14 => AluOp::Bic,
        15 => AluOp::Mvn,
        opcode => return Err(unsupported(address, code, "data processing", opcode)),
    };

    Ok(Operation::Alu { op, rdn, rm })
}

fn decode_special(address: u32, code: u32) -> Result<Operation, DecodeError> {
    // D:Rdn spans bit 7 and bits[2:0]
    let rdn = ((field(code, 7, 1) << 3) | field(code, 0, 3)) as u8;
    let rm = field(code, 3, 4) as u8;

    match field(code, 8, 2) {
        0 => Ok(Operation::AddHigh { rdn, rm }),
        2 => Ok(Operation::MoveRegister {
            rd: rdn,
            rm,
            set_flags: false,
        }),
        3 if bit(code, 7) => Ok(Operation::CallExchange { rm }),
        3 => Ok(Operation::BranchExchange { rm }),
        opcode => Err(unsupported(address, code, "special data processing", opcode)),
    }
}

fn decode_load_store_register(address: u32, code: u32) -> Result<Operation, DecodeError> {
    let (load, width) = match field(code, 9, 3) {
        0b000 => (false, Width::Word),
        0b001 => (false, Width::Halfword),
        0b010 => (false, Width::Byte),
        0b100 => (true, Width::Word),
        0b101 => (true, Width::Halfword),
        0b110 => (true, Width::Byte),
        opcode => return Err(unsupported(address, code, "load/store register", opcode)),
    };

    Ok(Operation::LoadStore {
        load,
        width,
        rt: low(code, 0),
        rn: low(code, 3),
        offset: Operand::Register(low(code, 6)),
    })
}

fn decode_load_store_immediate(code: u32) -> Result<Operation, DecodeError> {
    let imm5 = field(code, 6, 5);
    let load = bit(code, 11);

    // word offsets are scaled, byte offsets are not
    let (width, offset) = if bit(code, 12) {
        (Width::Byte, imm5)
    } else {
        (Width::Word, imm5 << 2)
    };

    Ok(Operation::LoadStore {
        load,
        width,
        rt: low(code, 0),
        rn: low(code, 3),
        offset: Operand::Immediate(offset),
    })
}

fn decode_load_store_halfword_or_stack(code: u32) -> Result<Operation, DecodeError> {
    let load = bit(code, 11);

    Ok(if bit(code, 12) {
        Operation::LoadStore {
            load,
            width: Width::Word,
            rt: low(code, 8),
            rn: SP,
            offset: Operand::Immediate(field(code, 0, 8) << 2),
        }
    } else {
        Operation::LoadStore {
            load,
            width: Width::Halfword,
            rt: low(code, 0),
            rn: low(code, 3),
            offset: Operand::Immediate(field(code, 6, 5) << 1),
        }
    })
}

fn decode_miscellaneous(address: u32, code: u32) -> Result<Operation, DecodeError> {
    if !bit(code, 12) {
        return Ok(Operation::AddressOf {
            rd: low(code, 8),
            base: if bit(code, 11) { SP } else { PC },
            imm: field(code, 0, 8) << 2,
        });
    }

    // the extra list bit stands for lr in push and pc in pop
    let list = field(code, 0, 8) as u16;
    let extra = field(code, 8, 1) as u16;

    match field(code, 8, 4) {
        0b0000 => Ok(Operation::AdjustStack {
            imm: field(code, 0, 7) << 2,
            subtract: bit(code, 7),
        }),
        0b0010 => {
            let op = match field(code, 6, 2) {
                0 => Extend::Sxth,
                1 => Extend::Sxtb,
                2 => Extend::Uxth,
                _ => Extend::Uxtb,
            };
            Ok(Operation::Extend {
                op,
                rd: low(code, 0),
                rm: low(code, 3),
            })
        }
        0b0100 | 0b0101 => Ok(Operation::Push {
            registers: list | (extra << 14),
        }),
        0b1100 | 0b1101 => Ok(Operation::Pop {
            registers: list | (extra << 15),
        }),
        0b1111 if list == 0 => Ok(Operation::Nop),
        0b1111 => Err(unsupported(address, code, "if-then and hint", list.into())),
        opcode => Err(unsupported(address, code, "miscellaneous", opcode)),
    }
}

fn decode_multiple_or_conditional(address: u32, code: u32) -> Result<Operation, DecodeError> {
    if !bit(code, 12) {
        return Ok(Operation::LoadStoreMultiple {
            load: bit(code, 11),
            rn: low(code, 8),
            registers: field(code, 0, 8) as u16,
        });
    }

    let condition = match field(code, 8, 4) {
        0b0000 => Condition::Eq,
        0b0001 => Condition::Ne,
        0b1001 => Condition::Ls,
        0b1010 => Condition::Ge,
        0b1011 => Condition::Lt,
        0b1101 => Condition::Le,
        opcode => return Err(unsupported(address, code, "conditional branch", opcode)),
    };

    let offset = sign_extend(field(code, 0, 8), 8) * 2;

    Ok(Operation::ConditionalBranch {
        condition,
        target: branch_target(address, offset),
    })
}

fn decode_branch(address: u32, code: u32) -> Result<Operation, DecodeError> {
    if field(code, 11, 2) != 0 {
        return Err(DecodeError::WideInstructionInThumbStream { address, code });
    }

    let offset = sign_extend(field(code, 0, 11), 11) * 2;

    Ok(Operation::Branch {
        target: branch_target(address, offset),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::LR;

    fn op(address: u32, code: u16) -> Operation {
        decode_thumb(address, code).unwrap().operation
    }

    #[test]
    fn decodes_move_immediate() {
        let instruction = decode_thumb(0x8000, 0x2005).unwrap();

        assert_eq!(instruction.address, 0x8000);
        assert_eq!(instruction.operation, Operation::MoveImmediate { rd: 0, imm: 5 });
        assert_eq!(instruction.place_id, 0);
        assert!(!instruction.reachable);
    }

    #[test]
    fn decodes_shift_group() {
        assert_eq!(
            op(0x8000, 0x0008),
            Operation::MoveRegister {
                rd: 0,
                rm: 1,
                set_flags: true
            }
        );
        assert_eq!(
            op(0x8000, 0x0088),
            Operation::Shift {
                op: Shift::Lsl,
                rd: 0,
                rm: 1,
                amount: 2
            }
        );
        assert_eq!(
            op(0x8000, 0x1808),
            Operation::AddSubtract {
                rd: 0,
                rn: 1,
                operand: Operand::Register(0),
                subtract: false
            }
        );
        assert_eq!(
            op(0x8000, 0x1e48),
            Operation::AddSubtract {
                rd: 0,
                rn: 1,
                operand: Operand::Immediate(1),
                subtract: true
            }
        );
    }

    #[test]
    fn decodes_compare_and_arithmetic_immediates() {
        assert_eq!(
            op(0x8000, 0x2b09),
            Operation::Compare {
                rn: 3,
                operand: Operand::Immediate(9)
            }
        );
        assert_eq!(
            op(0x8000, 0x3301),
            Operation::AddSubtractImmediate {
                rdn: 3,
                imm: 1,
                subtract: false
            }
        );
        assert_eq!(
            op(0x8000, 0x3b01),
            Operation::AddSubtractImmediate {
                rdn: 3,
                imm: 1,
                subtract: true
            }
        );
    }

    #[test]
    fn decodes_special_data_processing() {
        assert_eq!(op(0x8000, 0x4770), Operation::BranchExchange { rm: LR });
        assert_eq!(op(0x8000, 0x4798), Operation::CallExchange { rm: 3 });
        assert_eq!(
            op(0x8000, 0x46bd),
            Operation::MoveRegister {
                rd: SP,
                rm: 7,
                set_flags: false
            }
        );
        assert_eq!(op(0x8000, 0x4468), Operation::AddHigh { rdn: 0, rm: SP });
        assert_eq!(
            op(0x8000, 0x4013),
            Operation::Alu {
                op: AluOp::And,
                rdn: 3,
                rm: 2
            }
        );
        assert_eq!(
            op(0x8000, 0x429a),
            Operation::Compare {
                rn: 2,
                operand: Operand::Register(3)
            }
        );
    }

    #[test]
    fn decodes_literal_load_with_pool_address() {
        let instruction = decode_thumb(0x8002, 0x4b01).unwrap();

        assert_eq!(
            instruction.operation,
            Operation::LoadLiteral {
                rt: 3,
                imm8: 1,
                value: None
            }
        );
        assert_eq!(instruction.literal_address(), Some(0x8008));
        assert_eq!(instruction.memory_access_count(), 1);
    }

    #[test]
    fn decodes_loads_and_stores() {
        assert_eq!(
            op(0x8000, 0x607b),
            Operation::LoadStore {
                load: false,
                width: Width::Word,
                rt: 3,
                rn: 7,
                offset: Operand::Immediate(4)
            }
        );
        assert_eq!(
            op(0x8000, 0x7812),
            Operation::LoadStore {
                load: true,
                width: Width::Byte,
                rt: 2,
                rn: 2,
                offset: Operand::Immediate(0)
            }
        );
        assert_eq!(
            op(0x8000, 0x5cd3),
            Operation::LoadStore {
                load: true,
                width: Width::Byte,
                rt: 3,
                rn: 2,
                offset: Operand::Register(3)
            }
        );
        assert_eq!(
            op(0x8000, 0x9001),
            Operation::LoadStore {
                load: false,
                width: Width::Word,
                rt: 0,
                rn: SP,
                offset: Operand::Immediate(4)
            }
        );
    }

    #[test]
    fn decodes_stack_operations() {
        assert_eq!(op(0x8000, 0xb580), Operation::Push { registers: 0x4080 });
        assert_eq!(op(0x8000, 0xbd80), Operation::Pop { registers: 0x8080 });
        assert_eq!(
            op(0x8000, 0xb082),
            Operation::AdjustStack {
                imm: 8,
                subtract: true
            }
        );
        assert_eq!(
            op(0x8000, 0xaf00),
            Operation::AddressOf {
                rd: 7,
                base: SP,
                imm: 0
            }
        );
        assert_eq!(
            op(0x8000, 0xb2db),
            Operation::Extend {
                op: Extend::Uxtb,
                rd: 3,
                rm: 3
            }
        );
        assert_eq!(op(0x8000, 0xbf00), Operation::Nop);
    }

    #[test]
    fn decodes_conditional_branches_with_signed_offsets() {
        assert_eq!(
            op(0x8002, 0xd001),
            Operation::ConditionalBranch {
                condition: Condition::Eq,
                target: 0x8008
            }
        );
        assert_eq!(
            op(0x8020, 0xdbf0),
            Operation::ConditionalBranch {
                condition: Condition::Lt,
                target: 0x8004
            }
        );
        assert_eq!(
            op(0x8000, 0xd900),
            Operation::ConditionalBranch {
                condition: Condition::Ls,
                target: 0x8004
            }
        );
    }

    #[test]
    fn decodes_unconditional_branches_in_both_directions() {
        assert_eq!(op(0x8000, 0xe002), Operation::Branch { target: 0x8008 });
        assert_eq!(op(0x8010, 0xe7fe), Operation::Branch { target: 0x8010 });
    }

    #[test]
    fn decodes_load_store_multiple() {
        let instruction = decode_thumb(0x8000, 0xc90c).unwrap();

        assert_eq!(
            instruction.operation,
            Operation::LoadStoreMultiple {
                load: true,
                rn: 1,
                registers: 0x000c
            }
        );
        assert_eq!(instruction.memory_access_count(), 2);
    }

    #[test]
    fn rejects_unknown_encodings() {
        assert!(matches!(
            decode_thumb(0x8000, 0xdf00),
            Err(DecodeError::UnsupportedEncoding {
                group: "conditional branch",
                opcode: 0b1111,
                ..
            })
        ));
        assert!(matches!(
            decode_thumb(0x8000, 0xbf10),
            Err(DecodeError::UnsupportedEncoding { .. })
        ));
        assert_eq!(
            decode_thumb(0x8004, 0xf000),
            Err(DecodeError::WideInstructionInThumbStream {
                address: 0x8004,
                code: 0xf000
            })
        );
    }

    #[test]
    fn decoding_is_deterministic() {
        for code in (0..=u16::MAX).step_by(97) {
            assert_eq!(decode_thumb(0x8000, code), decode_thumb(0x8000, code));
        }
    }
}
