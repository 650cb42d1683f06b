#![allow(dead_code)]

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Render `(address, code)` pairs as trace lines. Codes above 16 bits become
/// 32-bit instruction records.
pub fn trace(lines: &[(u32, u32)]) -> String {
    lines
        .iter()
        .map(|&(address, code)| {
            let kind = if code > 0xffff { 'a' } else { 't' };
            format!("{}:{:x}:{:x}\n", kind, address, code)
        })
        .collect()
}

/// Function with a call, a conditional branch and a return through `pop`.
///
/// ```text
/// 8000: push {r7, lr}
/// 8002: movs r0, #5
/// 8004: bl 8010
/// 8008: cmp r0, #5
/// 800a: beq.n 800e
/// 800c: movs r0, #0
/// 800e: pop {r7, pc}
/// 8010: adds r0, #1
/// 8012: bx lr
/// ```
pub const CALL_PROGRAM: [(u32, u32); 9] = [
    (0x8000, 0xb580),
    (0x8002, 0x2005),
    (0x8004, 0xf000_f804),
    (0x8008, 0x2805),
    (0x800a, 0xd000),
    (0x800c, 0x2000),
    (0x800e, 0xbd80),
    (0x8010, 0x3001),
    (0x8012, 0x4770),
];
