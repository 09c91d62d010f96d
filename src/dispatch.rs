//! Opcode to instruction-class tables.
//!
//! Every class is described by a bit pattern in the usual manual notation:
//! `0`/`1` are fixed bits, `?` is an operand field, `-` is should-be-zero (not
//! decoded) and `.` is the condition field. Both tables are built once per
//! process by testing every index against every pattern.

use std::{fmt::Debug, sync::OnceLock};

use log::trace;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pattern {
    mask: u32,
    bits: u32,
}

impl Pattern {
    pub const fn new(s: &str) -> Self {
        let s = s.as_bytes();
        let mut mask = 0;
        let mut bits = 0;
        let mut len = 0;
        let mut i = 0;
        while i < s.len() {
            let c = s[i];
            i += 1;
            if c == b' ' {
                continue;
            }
            mask <<= 1;
            bits <<= 1;
            len += 1;
            match c {
                b'0' => mask |= 1,
                b'1' => {
                    mask |= 1;
                    bits |= 1;
                }
                b'?' | b'-' | b'.' => {}
                _ => panic!("invalid character in instruction pattern"),
            }
        }
        assert!(len == 16 || len == 32, "instruction pattern must be 16 or 32 bits wide");
        Pattern { mask, bits }
    }

    pub const fn matches(&self, opcode: u32) -> bool {
        opcode & self.mask == self.bits
    }

    const fn within(self, mask: u32) -> Self {
        Pattern {
            mask: self.mask & mask,
            bits: self.bits & mask,
        }
    }
}

struct Class<T> {
    pattern: Pattern,
    except: Option<Pattern>,
    instr: T,
}

impl<T> Class<T> {
    fn matches(&self, opcode: u32) -> bool {
        self.pattern.matches(opcode) && !self.except.map_or(false, |e| e.matches(opcode))
    }
}

fn class<T>(pattern: &str, instr: T) -> Class<T> {
    Class {
        pattern: Pattern::new(pattern),
        except: None,
        instr,
    }
}

fn class_except<T>(pattern: &str, except: &str, instr: T) -> Class<T> {
    Class {
        pattern: Pattern::new(pattern),
        except: Some(Pattern::new(except)),
        instr,
    }
}

/// Binds every index to exactly one of `classes`. Indices no class claims go to
/// the first matching `fallback` class; an index left unbound after that is a
/// defect in the class lists.
fn build_table<T: Copy + Debug>(
    size: usize,
    opcode_of: impl Fn(usize) -> u32,
    classes: &[Class<T>],
    fallback: &[Class<T>],
) -> Box<[T]> {
    let mut tbl: Vec<Option<T>> = vec![None; size];

    for (ix, slot) in tbl.iter_mut().enumerate() {
        let opcode = opcode_of(ix);
        let mut found = classes.iter().filter(|c| c.matches(opcode));
        if let Some(c) = found.next() {
            if let Some(other) = found.next() {
                panic!(
                    "ambiguous encoding {opcode:08X}: {:?} and {:?}",
                    c.instr, other.instr
                );
            }
            *slot = Some(c.instr);
        }
    }

    let mut unclaimed = 0;
    for (ix, slot) in tbl.iter_mut().enumerate() {
        if slot.is_none() {
            unclaimed += 1;
            let opcode = opcode_of(ix);
            *slot = fallback.iter().find(|c| c.matches(opcode)).map(|c| c.instr);
        }
    }
    trace!("{unclaimed} of {size} table slots left to the fallback classes");

    tbl.into_iter()
        .enumerate()
        .map(|(ix, slot)| match slot {
            Some(instr) => instr,
            None => panic!("instruction table slot {ix:#X} is not bound"),
        })
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArmInstr {
    Branch,
    BranchExchange,
    DataImmediate,
    DataImmediateShift,
    DataRegisterShift,
    LoadSignedImmediate,
    LoadSignedRegister,
    MemorySwap,
    MoveHalfImmediate,
    MoveHalfRegister,
    MoveImmediateOffset,
    MoveRegisterOffset,
    MoveMultiple,
    MoveToRegisterFromStatus,
    MoveToStatusFromImmediate,
    MoveToStatusFromRegister,
    Multiply,
    MultiplyLong,
    SoftwareInterrupt,
    CoprocessorDataProcessing,
    MoveToCoprocessorFromRegister,
    MoveToRegisterFromCoprocessor,
    Undefined,
}

/// Opcode bits that take part in the ARM table index: 27-20 and 7-4.
pub const ARM_INDEX_MASK: u32 = 0x0FF0_00F0;

pub fn arm_index(opcode: u32) -> usize {
    ((opcode >> 16) & 0xFF0 | (opcode >> 4) & 0xF) as usize
}

fn arm_opcode_of(index: usize) -> u32 {
    let index = index as u32;
    (index & 0xFF0) << 16 | (index & 0xF) << 4
}

#[rustfmt::skip]
fn arm_classes() -> Vec<Class<ArmInstr>> {
    use ArmInstr::*;

    // TST/TEQ/CMP/CMN without S are the status transfer and BX encodings
    const NO_FLAG_TEST_IMM: &str = ".... 0011 0??0 ???? ???? ???? ???? ????";
    const NO_FLAG_TEST_REG: &str = ".... 0001 0??0 ???? ???? ???? ???? ????";

    vec![
        class(".... 101? ???? ???? ???? ???? ???? ????", Branch),
        class(".... 0001 0010 ---- ---- ---- 0001 ????", BranchExchange),
        class_except(".... 001? ???? ???? ???? ???? ???? ????", NO_FLAG_TEST_IMM, DataImmediate),
        class_except(".... 000? ???? ???? ???? ???? ???0 ????", NO_FLAG_TEST_REG, DataImmediateShift),
        class_except(".... 000? ???? ???? ???? ???? 0??1 ????", NO_FLAG_TEST_REG, DataRegisterShift),
        class(".... 000? ?1?1 ???? ???? ???? 11?1 ????", LoadSignedImmediate),
        class(".... 000? ?0?1 ???? ???? ---- 11?1 ????", LoadSignedRegister),
        class(".... 0001 0?00 ???? ???? ---- 1001 ????", MemorySwap),
        class(".... 000? ?1?? ???? ???? ???? 1011 ????", MoveHalfImmediate),
        class(".... 000? ?0?? ???? ???? ---- 1011 ????", MoveHalfRegister),
        class(".... 010? ???? ???? ???? ???? ???? ????", MoveImmediateOffset),
        class(".... 011? ???? ???? ???? ???? ???0 ????", MoveRegisterOffset),
        class(".... 100? ???? ???? ???? ???? ???? ????", MoveMultiple),
        class(".... 0001 0?00 ---- ???? ---- 0000 ----", MoveToRegisterFromStatus),
        class(".... 0011 0?10 ???? ---- ???? ???? ????", MoveToStatusFromImmediate),
        class(".... 0001 0?10 ???? ---- ---- 0000 ????", MoveToStatusFromRegister),
        class(".... 0000 00?? ???? ???? ???? 1001 ????", Multiply),
        class(".... 0000 1??? ???? ???? ???? 1001 ????", MultiplyLong),
        class(".... 1111 ???? ???? ???? ???? ???? ????", SoftwareInterrupt),
        class(".... 1110 ???? ???? ???? ???? ???0 ????", CoprocessorDataProcessing),
        class(".... 1110 ???0 ???? ???? ???? ???1 ????", MoveToCoprocessorFromRegister),
        class(".... 1110 ???1 ???? ???? ???? ???1 ????", MoveToRegisterFromCoprocessor),
    ]
    .into_iter()
    .map(|c| Class {
        pattern: c.pattern.within(ARM_INDEX_MASK),
        except: c.except.map(|e| e.within(ARM_INDEX_MASK)),
        instr: c.instr,
    })
    .collect()
}

fn build_arm_table() -> Box<[ArmInstr]> {
    let catch_all = class(".... ???? ???? ---- ---- ---- ???? ----", ArmInstr::Undefined);
    build_table(0x1000, arm_opcode_of, &arm_classes(), &[catch_all])
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThumbInstr {
    ShiftImmediate,
    AdjustRegister,
    AdjustImmediate,
    Immediate,
    Alu,
    AluExtended,
    BranchExchange,
    LoadLiteral,
    MoveRegisterOffset,
    MoveWordImmediate,
    MoveByteImmediate,
    MoveHalfImmediate,
    MoveStack,
    AddRegister,
    AdjustStack,
    StackMultiple,
    MoveMultiple,
    BranchTest,
    SoftwareInterrupt,
    BranchNear,
    BranchFarPrefix,
    BranchFarSuffix,
    Undefined,
}

#[rustfmt::skip]
fn thumb_classes() -> Vec<Class<ThumbInstr>> {
    use ThumbInstr::*;

    vec![
        class_except("000? ???? ???? ????", "0001 1??? ???? ????", ShiftImmediate),
        class("0001 10?? ???? ????", AdjustRegister),
        class("0001 11?? ???? ????", AdjustImmediate),
        class("001? ???? ???? ????", Immediate),
        class("0100 00?? ???? ????", Alu),
        class_except("0100 01?? ???? ????", "0100 0111 ???? ????", AluExtended),
        class("0100 0111 0??? ?---", BranchExchange),
        class("0100 1??? ???? ????", LoadLiteral),
        class("0101 ???? ???? ????", MoveRegisterOffset),
        class("0110 ???? ???? ????", MoveWordImmediate),
        class("0111 ???? ???? ????", MoveByteImmediate),
        class("1000 ???? ???? ????", MoveHalfImmediate),
        class("1001 ???? ???? ????", MoveStack),
        class("1010 ???? ???? ????", AddRegister),
        class("1011 0000 ???? ????", AdjustStack),
        class("1011 ?10? ???? ????", StackMultiple),
        class("1100 ???? ???? ????", MoveMultiple),
        class_except("1101 ???? ???? ????", "1101 1111 ???? ????", BranchTest),
        class("1101 1111 ???? ????", SoftwareInterrupt),
        class("1110 0??? ???? ????", BranchNear),
        class("1111 0??? ???? ????", BranchFarPrefix),
        class("1111 1??? ???? ????", BranchFarSuffix),
    ]
}

fn build_thumb_table() -> Box<[ThumbInstr]> {
    let sweep = class("???? ???? ???? ????", ThumbInstr::Undefined);
    build_table(0x10000, |ix| ix as u32, &thumb_classes(), &[sweep])
}

static ARM_TABLE: OnceLock<Box<[ArmInstr]>> = OnceLock::new();
static THUMB_TABLE: OnceLock<Box<[ThumbInstr]>> = OnceLock::new();

pub fn arm_table() -> &'static [ArmInstr] {
    ARM_TABLE.get_or_init(build_arm_table)
}

pub fn thumb_table() -> &'static [ThumbInstr] {
    THUMB_TABLE.get_or_init(build_thumb_table)
}
