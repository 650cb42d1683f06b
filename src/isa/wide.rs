use super::{
    bit, branch_target, field, sign_extend, unsupported, DecodeError, Instruction, Operation, PC,
};

/// Decode a 32-bit instruction whose first halfword occupies bits[31:16].
pub fn decode_arm32(address: u32, code: u32) -> Result<Instruction, DecodeError> {
    let operation = match field(code, 27, 2) {
        0b10 if bit(code, 15) => decode_branch_and_control(address, code),
        0b10 if !bit(code, 25) => decode_modified_immediate(address, code),
        0b11 => decode_multiply_divide(address, code),
        op => Err(unsupported(address, code, "32-bit", op)),
    }?;

    Ok(Instruction::new(address, operation))
}

/// Expand the 12-bit `i:imm3:imm8` constant of data processing instructions.
pub fn thumb_expand_imm(imm12: u32) -> u32 {
    let imm8 = field(imm12, 0, 8);

    if field(imm12, 10, 2) == 0 {
        match field(imm12, 8, 2) {
            0 => imm8,
            1 => (imm8 << 16) | imm8,
            2 => (imm8 << 24) | (imm8 << 8),
            _ => imm8 * 0x0101_0101,
        }
    } else {
        let unrotated = 0x80 | field(imm12, 0, 7);
        unrotated.rotate_right(field(imm12, 7, 5))
    }
}

fn decode_branch_and_control(address: u32, code: u32) -> Result<Operation, DecodeError> {
    if !(bit(code, 14) && bit(code, 12)) {
        return Err(unsupported(address, code, "branch and control", field(code, 12, 3)));
    }

    let s = field(code, 26, 1);
    let j1 = field(code, 13, 1);
    let j2 = field(code, 11, 1);
    let i1 = !(j1 ^ s) & 1;
    let i2 = !(j2 ^ s) & 1;

    let imm25 = (s << 24)
        | (i1 << 23)
        | (i2 << 22)
        | (field(code, 16, 10) << 12)
        | (field(code, 0, 11) << 1);

    Ok(Operation::Call {
        target: branch_target(address, sign_extend(imm25, 25)),
    })
}

fn decode_modified_immediate(address: u32, code: u32) -> Result<Operation, DecodeError> {
    let op = field(code, 21, 4);
    let rd = field(code, 8, 4) as u8;

    // rd == pc with the add opcode is cmn
    if op != 0b1000 || rd == PC {
        return Err(unsupported(address, code, "modified immediate", op));
    }

    let imm12 = (field(code, 26, 1) << 11) | (field(code, 12, 3) << 8) | field(code, 0, 8);

    Ok(Operation::AddWide {
        rd,
        rn: field(code, 16, 4) as u8,
        imm: thumb_expand_imm(imm12),
        set_flags: bit(code, 20),
    })
}

fn decode_multiply_divide(address: u32, code: u32) -> Result<Operation, DecodeError> {
    let rd = field(code, 8, 4) as u8;
    let rn = field(code, 16, 4) as u8;
    let rm = field(code, 0, 4) as u8;

    match field(code, 20, 7) {
        0b011_0000 if field(code, 4, 2) == 0 && field(code, 12, 4) == 0xf => {
            Ok(Operation::Multiply { rd, rn, rm })
        }
        0b011_1001 if field(code, 4, 4) == 0xf => Ok(Operation::SignedDivide { rd, rn, rm }),
        op => Err(unsupported(address, code, "multiply and divide", op)),
    }
}
