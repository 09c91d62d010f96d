use bitvec::prelude::*;
use log::trace;

use crate::{
    alu, consts::*, context::Context, cpu::Cpu, dispatch::ThumbInstr, memory::Access,
    util::sign_extend,
};

impl Cpu {
    pub(crate) fn execute_thumb(&mut self, ctx: &mut impl Context, instr: ThumbInstr) {
        let opcode = self.opcode as u16;
        let v = opcode.view_bits::<Lsb0>();

        let d: u8 = v[0..=2].load();
        let n: u8 = v[3..=5].load();
        let m: u8 = v[6..=8].load();
        let imm5: u32 = v[6..=10].load();
        let imm8: u32 = v[0..=7].load();
        let hd: u8 = v[8..=10].load();
        let bit11 = v[11];

        use ThumbInstr::*;
        match instr {
            ShiftImmediate => thumb_op_shift_imm(self, d, n, imm5 as u8, v[11..=12].load()),
            AdjustRegister => {
                let rm = self.r(m);
                thumb_op_adjust(self, d, n, rm, v[9]);
            }
            AdjustImmediate => thumb_op_adjust(self, d, n, m as u32, v[9]),
            Immediate => thumb_op_imm(self, imm8, hd, v[11..=12].load()),
            Alu => thumb_op_alu(self, ctx, d, n, v[6..=9].load()),
            AluExtended => {
                let d = d | (v[7] as u8) << 3;
                thumb_op_alu_ext(self, d, v[3..=6].load(), v[8..=9].load());
            }
            BranchExchange => thumb_op_bx(self, v[3..=6].load()),
            LoadLiteral => {
                let addr = (self.r(15) & !3).wrapping_add(imm8 << 2);
                let data = self.load(ctx, Access::WORD, addr);
                self.set_r(hd, data);
            }
            MoveRegisterOffset => thumb_op_ldst_reg(self, ctx, d, n, m, v[9..=11].load()),
            MoveWordImmediate => {
                let addr = self.r(n).wrapping_add(imm5 << 2);
                thumb_op_ldst(self, ctx, Access::WORD, d, addr, bit11);
            }
            MoveByteImmediate => {
                let addr = self.r(n).wrapping_add(imm5);
                thumb_op_ldst(self, ctx, Access::BYTE, d, addr, bit11);
            }
            MoveHalfImmediate => {
                let addr = self.r(n).wrapping_add(imm5 << 1);
                thumb_op_ldst(self, ctx, Access::HALF, d, addr, bit11);
            }
            MoveStack => {
                let addr = self.r(13).wrapping_add(imm8 << 2);
                thumb_op_ldst(self, ctx, Access::WORD, hd, addr, bit11);
            }
            AddRegister => {
                let base = if bit11 { self.r(13) } else { self.r(15) & !3 };
                self.set_r(hd, base.wrapping_add(imm8 << 2));
            }
            AdjustStack => {
                let ofs = v[0..=6].load::<u32>() << 2;
                let sp = self.r(13);
                let sp = if v[7] {
                    sp.wrapping_sub(ofs)
                } else {
                    sp.wrapping_add(ofs)
                };
                self.set_r(13, sp);
            }
            StackMultiple => thumb_op_push_pop(self, ctx, imm8 as u16, v[8], bit11),
            MoveMultiple => thumb_op_ldstm(self, ctx, imm8 as u16, hd, bit11),
            BranchTest => {
                if alu::check_cond(self.registers().cpsr(), v[8..=11].load()) {
                    let pc = self.r(15);
                    self.set_r(15, pc.wrapping_add(sign_extend(imm8, 8) << 1));
                }
            }
            SoftwareInterrupt => self.exception(MODE_SUPERVISOR, VECTOR_SOFTWARE_INTERRUPT),
            BranchNear => {
                let pc = self.r(15);
                self.set_r(15, pc.wrapping_add(sign_extend(v[0..=10].load(), 11) << 1));
            }
            BranchFarPrefix => {
                let pc = self.r(15);
                self.set_r(14, pc.wrapping_add(sign_extend(v[0..=10].load(), 11) << 12));
            }
            BranchFarSuffix => {
                let lr = self.r(14);
                self.set_r(15, lr.wrapping_add(v[0..=10].load::<u32>() << 1));
                self.set_r(14, self.pipeline.decode.address | 1);
            }
            Undefined => {
                trace!(
                    "Undefined instruction: {:04X} at {:08X}",
                    opcode,
                    self.pipeline.execute.address
                );
                self.exception(MODE_UNDEFINED, VECTOR_UNDEFINED);
            }
        }
    }
}

fn thumb_op_shift_imm(cpu: &mut Cpu, d: u8, m: u8, amount: u8, shift_type: u8) {
    let rm = cpu.r(m);
    let res = cpu.shift_immediate(shift_type, rm, amount);
    let res = cpu.bit(res);
    cpu.set_r(d, res);
}

fn thumb_op_adjust(cpu: &mut Cpu, d: u8, n: u8, operand: u32, sub: bool) {
    let rn = cpu.r(n);
    let res = if sub {
        cpu.sub(rn, operand, true)
    } else {
        cpu.add(rn, operand, false)
    };
    cpu.set_r(d, res);
}

fn thumb_op_imm(cpu: &mut Cpu, imm: u32, d: u8, op: u8) {
    let rd = cpu.r(d);
    match op {
        0 => {
            let res = cpu.bit(imm);
            cpu.set_r(d, res);
        }
        1 => {
            cpu.sub(rd, imm, true);
        }
        2 => {
            let res = cpu.add(rd, imm, false);
            cpu.set_r(d, res);
        }
        _ => {
            let res = cpu.sub(rd, imm, true);
            cpu.set_r(d, res);
        }
    }
}

fn thumb_op_alu(cpu: &mut Cpu, ctx: &mut impl Context, d: u8, m: u8, op: u8) {
    let rd = cpu.r(d);
    let rm = cpu.r(m);
    let c = cpu.registers().cpsr().c();

    let res = match op {
        0x0 => Some(cpu.bit(rd & rm)), // AND
        0x1 => Some(cpu.bit(rd ^ rm)), // EOR
        0x2 | 0x3 | 0x4 | 0x7 => {
            // LSL, LSR, ASR, ROR
            let shift_type = match op {
                0x2 => 0,
                0x3 => 1,
                0x4 => 2,
                _ => 3,
            };
            let res = cpu.shift_register(shift_type, rd, rm as u8);
            let res = cpu.bit(res);
            cpu.idle(ctx);
            Some(res)
        }
        0x5 => Some(cpu.add(rd, rm, c)), // ADC
        0x6 => Some(cpu.sub(rd, rm, c)), // SBC
        0x8 => {
            cpu.bit(rd & rm); // TST
            None
        }
        0x9 => Some(cpu.sub(0, rm, true)), // NEG
        0xA => {
            cpu.sub(rd, rm, true); // CMP
            None
        }
        0xB => {
            cpu.add(rd, rm, false); // CMN
            None
        }
        0xC => Some(cpu.bit(rd | rm)),       // ORR
        0xD => Some(cpu.mul(ctx, 0, rm, rd)), // MUL
        0xE => Some(cpu.bit(rd & !rm)),      // BIC
        _ => Some(cpu.bit(!rm)),             // MVN
    };

    if let Some(res) = res {
        cpu.set_r(d, res);
    }
}

/// High register forms. Only CMP touches the flags.
fn thumb_op_alu_ext(cpu: &mut Cpu, d: u8, m: u8, op: u8) {
    let rd = cpu.r(d);
    let rm = cpu.r(m);
    match op {
        0 => cpu.set_r(d, rd.wrapping_add(rm)),
        1 => {
            cpu.sub(rd, rm, true);
        }
        _ => cpu.set_r(d, rm),
    }
}

fn thumb_op_bx(cpu: &mut Cpu, m: u8) {
    let addr = cpu.r(m);
    cpu.cpsr().set_thumb(addr & 1 != 0);
    cpu.set_r(15, addr);
}

fn thumb_op_ldst(
    cpu: &mut Cpu,
    ctx: &mut impl Context,
    access: Access,
    d: u8,
    addr: u32,
    load: bool,
) {
    if load {
        let data = cpu.load(ctx, access, addr);
        cpu.set_r(d, data);
    } else {
        let data = cpu.r(d);
        cpu.store(ctx, access, addr, data);
    }
}

fn thumb_op_ldst_reg(cpu: &mut Cpu, ctx: &mut impl Context, d: u8, n: u8, m: u8, op: u8) {
    let addr = cpu.r(n).wrapping_add(cpu.r(m));
    let (access, load) = match op {
        0 => (Access::WORD, false),                 // STR
        1 => (Access::HALF, false),                 // STRH
        2 => (Access::BYTE, false),                 // STRB
        3 => (Access::BYTE | Access::SIGNED, true), // LDSB
        4 => (Access::WORD, true),                  // LDR
        5 => (Access::HALF, true),                  // LDRH
        6 => (Access::BYTE, true),                  // LDRB
        _ => (Access::HALF | Access::SIGNED, true), // LDSH
    };
    thumb_op_ldst(cpu, ctx, access, d, addr, load);
}

fn thumb_op_ldstm(cpu: &mut Cpu, ctx: &mut impl Context, list: u16, n: u8, load: bool) {
    let count = if list != 0 { list.count_ones() } else { 16 };
    let mut addr = cpu.r(n);
    let end = addr.wrapping_add(count * 4);

    if load && list & (1 << n) == 0 {
        cpu.set_r(n, end);
    }

    cpu.end_burst();
    let list = if list == 0 { 0x8000 } else { list };
    for m in list.view_bits::<Lsb0>().iter_ones() {
        let m = m as u8;
        if load {
            let data = cpu.read(ctx, Access::WORD, addr);
            cpu.set_r(m, data);
        } else {
            let data = cpu.r(m).wrapping_add(if m == 15 { 2 } else { 0 });
            cpu.write(ctx, Access::WORD, addr, data);
            cpu.set_r(n, end);
        }
        addr = addr.wrapping_add(4);
    }

    if load {
        cpu.idle(ctx);
    } else {
        cpu.end_burst();
    }
}

/// `PUSH {rlist, lr}` / `POP {rlist, pc}`.
fn thumb_op_push_pop(cpu: &mut Cpu, ctx: &mut impl Context, list: u16, lrpc: bool, pop: bool) {
    let mut list = list;
    if lrpc {
        list |= if pop { 1 << 15 } else { 1 << 14 };
    }
    let count = if list != 0 { list.count_ones() } else { 16 };

    let sp = cpu.r(13);
    let mut addr = if pop {
        cpu.set_r(13, sp.wrapping_add(count * 4));
        sp
    } else {
        sp.wrapping_sub(count * 4)
    };

    cpu.end_burst();
    let list = if list == 0 { 0x8000 } else { list };
    for m in list.view_bits::<Lsb0>().iter_ones() {
        let m = m as u8;
        if pop {
            let data = cpu.read(ctx, Access::WORD, addr);
            cpu.set_r(m, data);
        } else {
            let data = cpu.r(m).wrapping_add(if m == 15 { 2 } else { 0 });
            cpu.write(ctx, Access::WORD, addr, data);
        }
        addr = addr.wrapping_add(4);
    }

    if pop {
        cpu.idle(ctx);
    } else {
        cpu.end_burst();
        cpu.set_r(13, sp.wrapping_sub(count * 4));
    }
}
