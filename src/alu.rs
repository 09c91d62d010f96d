//! Flag-producing arithmetic shared by both instruction sets.
//!
//! Everything here is a pure function of its operands. The shifter helpers take
//! the incoming carry and return the shifter carry-out next to the value; whether
//! any of it reaches the CPSR is decided by the caller.

use crate::registers::Psr;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AddResult {
    pub value: u32,
    pub carry: bool,
    pub overflow: bool,
}

pub fn add_with_flag(a: u32, b: u32, c: bool) -> AddResult {
    let value = a.wrapping_add(b).wrapping_add(c as u32);
    let overflow = !(a ^ b) & (a ^ value);
    AddResult {
        value,
        carry: (overflow ^ a ^ b ^ value) >> 31 != 0,
        overflow: overflow >> 31 != 0,
    }
}

/// `a - b - !c`; carry out is NOT borrow.
pub fn sub_with_flag(a: u32, b: u32, c: bool) -> AddResult {
    add_with_flag(a, !b, c)
}

pub fn lsl(a: u32, amount: u8, carry: bool) -> (u32, bool) {
    if amount == 0 {
        return (a, carry);
    }
    let carry = if amount > 32 {
        false
    } else {
        (a >> (32 - amount as u32)) & 1 != 0
    };
    let data = if amount > 31 { 0 } else { a << amount };
    (data, carry)
}

pub fn lsr(a: u32, amount: u8, carry: bool) -> (u32, bool) {
    if amount == 0 {
        return (a, carry);
    }
    let carry = if amount > 32 {
        false
    } else {
        (a >> (amount - 1)) & 1 != 0
    };
    let data = if amount > 31 { 0 } else { a >> amount };
    (data, carry)
}

pub fn asr(a: u32, amount: u8, carry: bool) -> (u32, bool) {
    if amount == 0 {
        return (a, carry);
    }
    let carry = if amount > 32 {
        a >> 31 != 0
    } else {
        (a >> (amount - 1)) & 1 != 0
    };
    let data = if amount > 31 {
        ((a as i32) >> 31) as u32
    } else {
        ((a as i32) >> amount) as u32
    };
    (data, carry)
}

pub fn ror(a: u32, amount: u8, carry: bool) -> (u32, bool) {
    if amount == 0 {
        return (a, carry);
    }
    let data = a.rotate_right((amount & 0x1F) as u32);
    (data, data >> 31 != 0)
}

/// Rotate right by one through the carry flag.
pub fn rrx(a: u32, carry: bool) -> (u32, bool) {
    ((carry as u32) << 31 | a >> 1, a & 1 != 0)
}

/// Immediate-shift forms: an encoded amount of zero means LSR #32, ASR #32 and
/// RRX respectively for the three right shifts.
pub fn shift_immediate(shift_type: u8, a: u32, amount: u8, carry: bool) -> (u32, bool) {
    match shift_type & 3 {
        0 => lsl(a, amount, carry),
        1 => lsr(a, if amount == 0 { 32 } else { amount }, carry),
        2 => asr(a, if amount == 0 { 32 } else { amount }, carry),
        _ => {
            if amount == 0 {
                rrx(a, carry)
            } else {
                ror(a, amount, carry)
            }
        }
    }
}

/// Register-shift forms: only the low byte of the amount is used and zero passes
/// the operand through untouched.
pub fn shift_register(shift_type: u8, a: u32, amount: u8, carry: bool) -> (u32, bool) {
    match shift_type & 3 {
        0 => lsl(a, amount, carry),
        1 => lsr(a, amount, carry),
        2 => asr(a, amount, carry),
        _ => ror(a, amount, carry),
    }
}

/// Extra internal cycles taken by the multiplier array beyond the first.
///
/// The array retires 8 bits of the multiplier per cycle and stops early once the
/// remaining bits are all zero (or, for signed operation, all ones).
pub fn multiplier_cycles(multiplier: u32, signed: bool) -> u32 {
    let mut cycles = 0;
    for sft in [8, 16, 24] {
        let rest = multiplier >> sft;
        let ones = u32::MAX >> sft;
        if rest != 0 && !(signed && rest == ones) {
            cycles += 1;
        }
    }
    cycles
}

pub fn check_cond(psr: &Psr, cond: u8) -> bool {
    let (n, z, c, v) = (psr.n(), psr.z(), psr.c(), psr.v());
    match cond & 0xF {
        0b0000 => z,                // EQ
        0b0001 => !z,               // NE
        0b0010 => c,                // CS
        0b0011 => !c,               // CC
        0b0100 => n,                // MI
        0b0101 => !n,               // PL
        0b0110 => v,                // VS
        0b0111 => !v,               // VC
        0b1000 => c && !z,          // HI
        0b1001 => !c || z,          // LS
        0b1010 => n == v,           // GE
        0b1011 => n != v,           // LT
        0b1100 => !z && n == v,     // GT
        0b1101 => z || n != v,      // LE
        0b1110 => true,             // AL
        _ => false,                 // NV
    }
}
