use bitvec::prelude::*;
use log::{trace, warn};

use crate::{
    alu,
    consts::*,
    context::Context,
    coprocessor::{DataProcessing, RegisterTransfer},
    cpu::Cpu,
    dispatch::ArmInstr,
    memory::Access,
    util::sign_extend,
};

impl Cpu {
    pub(crate) fn execute_arm(&mut self, ctx: &mut impl Context, instr: ArmInstr) {
        let opcode = self.opcode;

        use ArmInstr::*;
        match instr {
            Branch => arm_op_b(self, opcode),
            BranchExchange => arm_op_bx(self, opcode),
            DataImmediate => arm_op_alu_imm(self, opcode),
            DataImmediateShift => arm_op_alu_sft_imm(self, opcode),
            DataRegisterShift => arm_op_alu_sft_reg(self, ctx, opcode),
            MoveHalfImmediate | MoveHalfRegister | LoadSignedImmediate | LoadSignedRegister => {
                arm_op_ldsth(self, ctx, opcode)
            }
            MoveImmediateOffset | MoveRegisterOffset => arm_op_ldst(self, ctx, opcode),
            MemorySwap => arm_op_swp(self, ctx, opcode),
            MoveMultiple => arm_op_ldstm(self, ctx, opcode),
            MoveToRegisterFromStatus => arm_op_mrs(self, opcode),
            MoveToStatusFromImmediate | MoveToStatusFromRegister => arm_op_msr(self, opcode),
            Multiply => arm_op_mul(self, ctx, opcode),
            MultiplyLong => arm_op_mull(self, ctx, opcode),
            SoftwareInterrupt => self.exception(MODE_SUPERVISOR, VECTOR_SOFTWARE_INTERRUPT),
            CoprocessorDataProcessing => arm_op_cdp(self, opcode),
            MoveToCoprocessorFromRegister => arm_op_mcr(self, opcode),
            MoveToRegisterFromCoprocessor => arm_op_mrc(self, opcode),
            Undefined => arm_op_undef(self),
        }
    }
}

fn arm_op_b(cpu: &mut Cpu, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let offset = sign_extend(v[0..=23].load(), 24);
    let pc = cpu.r(15);
    if v[24] {
        cpu.set_r(14, pc.wrapping_sub(4));
    }
    cpu.set_r(15, pc.wrapping_add(offset << 2));
}

fn arm_op_bx(cpu: &mut Cpu, instr: u32) {
    let addr = cpu.r(instr as u8 & 0xF);
    cpu.cpsr().set_thumb(addr & 1 != 0);
    cpu.set_r(15, addr);
}

fn arm_alu(cpu: &mut Cpu, instr: u32, rn: u32, rm: u32) {
    let v = instr.view_bits::<Lsb0>();
    let op: u8 = v[21..=24].load();
    let d: u8 = v[12..=15].load();
    let c = cpu.registers().cpsr().c();

    let res = match op {
        0 => Some(cpu.bit(rn & rm)),       // AND
        1 => Some(cpu.bit(rn ^ rm)),       // EOR
        2 => Some(cpu.sub(rn, rm, true)),  // SUB
        3 => Some(cpu.sub(rm, rn, true)),  // RSB
        4 => Some(cpu.add(rn, rm, false)), // ADD
        5 => Some(cpu.add(rn, rm, c)),     // ADC
        6 => Some(cpu.sub(rn, rm, c)),     // SBC
        7 => Some(cpu.sub(rm, rn, c)),     // RSC
        8 => {
            cpu.bit(rn & rm); // TST
            None
        }
        9 => {
            cpu.bit(rn ^ rm); // TEQ
            None
        }
        10 => {
            cpu.sub(rn, rm, true); // CMP
            None
        }
        11 => {
            cpu.add(rn, rm, false); // CMN
            None
        }
        12 => Some(cpu.bit(rn | rm)),  // ORR
        13 => Some(cpu.bit(rm)),       // MOV
        14 => Some(cpu.bit(rn & !rm)), // BIC
        _ => Some(cpu.bit(!rm)),       // MVN
    };

    if let Some(res) = res {
        cpu.set_r(d, res);
    }

    if cpu.registers().in_exception() && d == 15 && v[20] {
        let spsr = cpu.registers().spsr();
        *cpu.cpsr() = spsr;
    }
}

fn arm_op_alu_imm(cpu: &mut Cpu, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let imm: u32 = v[0..=7].load();
    let rotate: u8 = v[8..=11].load();
    let rn = cpu.r(v[16..=19].load());
    let data = if rotate != 0 {
        cpu.ror(imm, rotate << 1)
    } else {
        imm
    };
    arm_alu(cpu, instr, rn, data);
}

fn arm_op_alu_sft_imm(cpu: &mut Cpu, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let rn = cpu.r(v[16..=19].load());
    let rm = cpu.r(v[0..=3].load());
    let rm = cpu.shift_immediate(v[5..=6].load(), rm, v[7..=11].load());
    arm_alu(cpu, instr, rn, rm);
}

fn arm_op_alu_sft_reg(cpu: &mut Cpu, ctx: &mut impl Context, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let n: u8 = v[16..=19].load();
    let m: u8 = v[0..=3].load();

    // The shift amount is read in an extra cycle, by which time r15 has moved on.
    let pc_bias = |r: u8| if r == 15 { 4 } else { 0 };
    let rs = cpu.r(v[8..=11].load()) as u8;
    let rn = cpu.r(n).wrapping_add(pc_bias(n));
    let rm = cpu.r(m).wrapping_add(pc_bias(m));

    cpu.idle(ctx);
    let rm = cpu.shift_register(v[5..=6].load(), rm, rs);
    arm_alu(cpu, instr, rn, rm);
}

/// Shared tail of the single-register transfers. `pc_writeback` is set for the
/// halfword and signed forms, which write back r15 bases with the extra cycle's lead.
fn arm_transfer(
    cpu: &mut Cpu,
    ctx: &mut impl Context,
    instr: u32,
    access: Access,
    offset: u32,
    pc_writeback: bool,
) {
    let v = instr.view_bits::<Lsb0>();
    let d: u8 = v[12..=15].load();
    let n: u8 = v[16..=19].load();
    let (load, writeback, up, pre) = (v[20], v[21], v[23], v[24]);

    let apply = |addr: u32| {
        if up {
            addr.wrapping_add(offset)
        } else {
            addr.wrapping_sub(offset)
        }
    };

    let mut rn = cpu.r(n);
    let mut rd = cpu.r(d).wrapping_add(if d == 15 { 4 } else { 0 });

    if pre {
        rn = apply(rn);
    }
    if load {
        rd = cpu.load(ctx, access, rn);
    } else {
        cpu.store(ctx, access, rn, rd);
    }
    if !pre {
        rn = apply(rn);
    }

    if !pre || writeback {
        let bias = if pc_writeback && n == 15 { 4 } else { 0 };
        cpu.set_r(n, rn.wrapping_add(bias));
    }
    if load {
        cpu.set_r(d, rd);
    }
}

fn arm_op_ldst(cpu: &mut Cpu, ctx: &mut impl Context, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let offset = if v[25] {
        let rm = cpu.r(v[0..=3].load());
        cpu.shift_immediate(v[5..=6].load(), rm, v[7..=11].load())
    } else {
        v[0..=11].load()
    };
    let access = if v[22] { Access::BYTE } else { Access::WORD };
    arm_transfer(cpu, ctx, instr, access, offset, false);
}

fn arm_op_ldsth(cpu: &mut Cpu, ctx: &mut impl Context, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let access = match v[5..=6].load::<u8>() {
        1 => Access::HALF,
        2 => Access::BYTE | Access::SIGNED,
        _ => Access::HALF | Access::SIGNED,
    };
    let offset = if v[22] {
        v[8..=11].load::<u32>() << 4 | v[0..=3].load::<u32>()
    } else {
        cpu.r(v[0..=3].load())
    };
    arm_transfer(cpu, ctx, instr, access, offset, true);
}

fn arm_op_swp(cpu: &mut Cpu, ctx: &mut impl Context, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let m: u8 = v[0..=3].load();
    let access = if v[22] { Access::BYTE } else { Access::WORD };
    let addr = cpu.r(v[16..=19].load());

    ctx.lock();
    let word = cpu.load(ctx, access, addr);
    let data = cpu.r(m).wrapping_add(if m == 15 { 4 } else { 0 });
    cpu.store(ctx, access, addr, data);
    ctx.unlock();

    cpu.set_r(v[12..=15].load(), word);
}

fn arm_op_ldstm(cpu: &mut Cpu, ctx: &mut impl Context, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let list: u16 = v[0..=15].load();
    let n: u8 = v[16..=19].load();
    let (load, writeback, user, up, pre) = (v[20], v[21], v[22], v[23], v[24]);

    let count = if list != 0 { list.count_ones() } else { 16 };
    let base = cpu.r(n);
    let (end, mut addr) = if up {
        let end = base.wrapping_add(count * 4);
        (end, if pre { base.wrapping_add(4) } else { base })
    } else {
        let end = base.wrapping_sub(count * 4);
        (end, if pre { end } else { end.wrapping_add(4) })
    };

    let mode = cpu.registers().mode();
    let usr = user && !(load && list & 0x8000 != 0);
    if usr {
        cpu.registers_mut().set_mode(MODE_USER);
    }

    if writeback && load && list & (1 << n) == 0 {
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
            let bias = if m == 15 && !(n == 15 && writeback) { 4 } else { 0 };
            let data = cpu.r(m).wrapping_add(bias);
            cpu.write(ctx, Access::WORD, addr, data);
            // base is updated after the first store
            if writeback {
                cpu.set_r(n, end);
            }
        }
        addr = addr.wrapping_add(4);
    }

    if usr {
        cpu.registers_mut().set_mode(mode);
    }

    if load {
        cpu.idle(ctx);
        if user && list & 0x8000 != 0 && cpu.registers().has_spsr() {
            let spsr = cpu.registers().spsr();
            *cpu.cpsr() = spsr;
        }
    } else {
        cpu.end_burst();
    }
}

fn arm_op_mrs(cpu: &mut Cpu, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let regs = cpu.registers();
    let psr = if v[22] && regs.has_spsr() {
        regs.spsr()
    } else {
        *regs.cpsr()
    };
    cpu.set_r(v[12..=15].load(), psr.into());
}

fn arm_op_msr(cpu: &mut Cpu, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let field: u8 = v[16..=19].load();
    let data = if v[25] {
        let imm: u32 = v[0..=7].load();
        let rotate: u8 = v[8..=11].load();
        if rotate != 0 {
            cpu.ror(imm, rotate << 1)
        } else {
            imm
        }
    } else {
        cpu.r(v[0..=3].load())
    };

    if v[22] {
        cpu.registers_mut().set_spsr_fields(field, data);
        return;
    }

    let field = if cpu.registers().privileged() {
        field
    } else {
        field & !1
    };
    cpu.cpsr().set_fields(field, data);
    if cpu.registers().cpsr().thumb() {
        let pc = cpu.registers_mut().pc_mut();
        *pc = pc.wrapping_add(2);
    }
}

fn arm_op_mul(cpu: &mut Cpu, ctx: &mut impl Context, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    // rd lives in bits 16-19 and the addend in 12-15
    let d: u8 = v[16..=19].load();
    let accumulate = v[21];

    if accumulate {
        cpu.idle(ctx);
    }
    let product = if accumulate { cpu.r(v[12..=15].load()) } else { 0 };
    let rm = cpu.r(v[0..=3].load());
    let rs = cpu.r(v[8..=11].load());
    let res = cpu.mul(ctx, product, rm, rs);
    if d != 15 {
        cpu.set_r(d, res);
    }
}

fn arm_op_mull(cpu: &mut Cpu, ctx: &mut impl Context, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let lo: u8 = v[12..=15].load();
    let hi: u8 = v[16..=19].load();
    let (accumulate, signed) = (v[21], v[22]);
    let rm = cpu.r(v[0..=3].load());
    let rs = cpu.r(v[8..=11].load());

    cpu.idle(ctx);
    cpu.idle(ctx);
    if accumulate {
        cpu.idle(ctx);
    }
    for _ in 0..alu::multiplier_cycles(rs, signed) {
        cpu.idle(ctx);
    }

    let mut res = if signed {
        (rm as i32 as i64).wrapping_mul(rs as i32 as i64) as u64
    } else {
        rm as u64 * rs as u64
    };
    if accumulate {
        res = res.wrapping_add((cpu.r(hi) as u64) << 32 | cpu.r(lo) as u64);
    }

    if lo != 15 {
        cpu.set_r(lo, res as u32);
    }
    if hi != 15 {
        cpu.set_r(hi, (res >> 32) as u32);
    }

    if v[20] {
        let cpsr = cpu.cpsr();
        cpsr.set_z(res == 0);
        cpsr.set_n(res >> 63 != 0);
    }
}

fn register_transfer(instr: u32) -> RegisterTransfer {
    let v = instr.view_bits::<Lsb0>();
    RegisterTransfer {
        op1: v[21..=23].load(),
        cn: v[16..=19].load(),
        cm: v[0..=3].load(),
        op2: v[5..=7].load(),
    }
}

fn arm_op_cdp(cpu: &mut Cpu, instr: u32) {
    let v = instr.view_bits::<Lsb0>();
    let id: u8 = v[8..=11].load();
    let op = DataProcessing {
        op1: v[20..=23].load(),
        cn: v[16..=19].load(),
        cd: v[12..=15].load(),
        cm: v[0..=3].load(),
        op2: v[5..=7].load(),
    };
    match cpu.coprocessor.data_processing[id as usize].as_mut() {
        Some(hook) => hook(op),
        None => {
            warn!("CDP: no coprocessor bound to p{id}");
            arm_op_undef(cpu);
        }
    }
}

fn arm_op_mcr(cpu: &mut Cpu, instr: u32) {
    let id = (instr >> 8) as u8 & 0xF;
    let data = cpu.r((instr >> 12) as u8 & 0xF);
    match cpu.coprocessor.move_to[id as usize].as_mut() {
        Some(hook) => hook(register_transfer(instr), data),
        None => {
            warn!("MCR: no coprocessor bound to p{id}");
            arm_op_undef(cpu);
        }
    }
}

fn arm_op_mrc(cpu: &mut Cpu, instr: u32) {
    let id = (instr >> 8) as u8 & 0xF;
    let data = match cpu.coprocessor.move_from[id as usize].as_mut() {
        Some(hook) => hook(register_transfer(instr)),
        None => {
            warn!("MRC: no coprocessor bound to p{id}");
            return arm_op_undef(cpu);
        }
    };
    cpu.set_r((instr >> 12) as u8 & 0xF, data);
}

fn arm_op_undef(cpu: &mut Cpu) {
    trace!(
        "Undefined instruction: {:08X} at {:08X}",
        cpu.opcode,
        cpu.pipeline().execute.address
    );
    cpu.exception(MODE_UNDEFINED, VECTOR_UNDEFINED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, TestBus};
    use pretty_assertions::assert_eq;

    /// Powers on, lets `setup` poke at the state, then runs one instruction per word.
    fn run(program: &[u32], setup: impl FnOnce(&mut Cpu, &mut TestBus)) -> (Cpu, TestBus) {
        let mut bus = TestBus::new();
        bus.load_words(0, program);
        let mut cpu = Cpu::new();
        cpu.power();
        setup(&mut cpu, &mut bus);
        bus.clear_events();
        for _ in 0..program.len() {
            cpu.instruction(&mut bus);
        }
        (cpu, bus)
    }

    fn flags(cpu: &Cpu) -> (bool, bool, bool, bool) {
        let cpsr = cpu.registers().cpsr();
        (cpsr.n(), cpsr.z(), cpsr.c(), cpsr.v())
    }

    #[test]
    fn data_processing_truth_table() {
        #[rustfmt::skip]
        let cases: [(u32, u32, u32, bool, Option<u32>, (bool, bool, bool, bool)); 16] = [
            // op, rn, rm, carry in, rd, nzcv
            (0x0, 0xF000_000F, 0x8000_00FF, true, Some(0x8000_000F), (true, false, true, false)),
            (0x1, 0xFFFF_FFFF, 0xFFFF_FFFF, false, Some(0), (false, true, false, false)),
            (0x2, 5, 7, false, Some(0xFFFF_FFFE), (true, false, false, false)),
            (0x3, 5, 7, false, Some(2), (false, false, true, false)),
            (0x4, 0x7FFF_FFFF, 1, true, Some(0x8000_0000), (true, false, false, true)),
            (0x5, 0xFFFF_FFFF, 0, true, Some(0), (false, true, true, false)),
            (0x6, 10, 3, false, Some(6), (false, false, true, false)),
            (0x7, 3, 10, true, Some(7), (false, false, true, false)),
            (0x8, 0xF0, 0x0F, false, None, (false, true, false, false)),
            (0x9, 0x8000_0000, 0, false, None, (true, false, false, false)),
            (0xA, 3, 3, false, None, (false, true, true, false)),
            (0xB, 0xFFFF_FFFF, 1, false, None, (false, true, true, false)),
            (0xC, 0x0F, 0xF0, false, Some(0xFF), (false, false, false, false)),
            (0xD, 0x1234, 0, true, Some(0), (false, true, true, false)),
            (0xE, 0xFF, 0x0F, false, Some(0xF0), (false, false, false, false)),
            (0xF, 0x1234, 0, false, Some(0xFFFF_FFFF), (true, false, false, false)),
        ];

        for (op, rn, rm, c, rd, nzcv) in cases {
            // <op>s r2, r0, r1
            let opcode = 0xE010_2001 | op << 21;
            let (cpu, _) = run(&[opcode], |cpu, _| {
                cpu.set_r(0, rn);
                cpu.set_r(1, rm);
                cpu.set_r(2, 0xDEAD);
                cpu.cpsr().set_c(c);
            });
            assert_eq!(cpu.r(2), rd.unwrap_or(0xDEAD), "op {op:X}");
            assert_eq!(flags(&cpu), nzcv, "op {op:X}");
        }
    }

    #[test]
    fn flags_untouched_without_s_bit() {
        // adds r2, r0, r1 vs add r2, r0, r1
        let (cpu, _) = run(&[0xE080_2001], |cpu, _| {
            cpu.set_r(0, 0xFFFF_FFFF);
            cpu.set_r(1, 1);
        });
        assert_eq!(cpu.r(2), 0);
        assert_eq!(flags(&cpu), (false, false, false, false));
    }

    #[test]
    fn shifter_operands() {
        #[rustfmt::skip]
        let cases: [(u32, u32, u32, bool, u32, bool); 9] = [
            // opcode, rm, rs, carry in, result, carry out
            (0xE1B0_2201, 0x1000_0001, 0, false, 0x0000_0010, true),  // lsl #4
            (0xE1B0_2021, 0x8000_0000, 0, false, 0, true),            // lsr #32
            (0xE1B0_2041, 0x8000_0000, 0, false, 0xFFFF_FFFF, true),  // asr #32
            (0xE1B0_2061, 0x0000_0001, 0, true, 0x8000_0000, true),   // rrx
            (0xE1B0_2261, 0x0000_000F, 0, false, 0xF000_0000, true),  // ror #4
            (0xE1B0_2311, 0xFFFF_FFFF, 33, true, 0, false),           // lsl r3 (33)
            (0xE1B0_2331, 0x8000_0000, 0, true, 0x8000_0000, true),   // lsr r3 (0)
            (0xE1B0_2351, 0x8000_0000, 40, false, 0xFFFF_FFFF, true), // asr r3 (40)
            (0xE3B0_24FF, 0, 0, false, 0xFF00_0000, true),            // #0xFF, ror #8
        ];

        for (opcode, rm, rs, c, res, carry) in cases {
            let (cpu, _) = run(&[opcode], |cpu, _| {
                cpu.set_r(1, rm);
                cpu.set_r(3, rs);
                cpu.cpsr().set_c(c);
            });
            assert_eq!(cpu.r(2), res, "{opcode:08X}");
            assert_eq!(cpu.registers().cpsr().c(), carry, "{opcode:08X}");
        }
    }

    #[test]
    fn register_shift_reads_pc_one_cycle_later() {
        let (cpu, bus) = run(
            &[
                0xE1A0_000F, // mov r0, pc
                0xE1A0_231F, // mov r2, pc, lsl r3
            ],
            |_, _| {},
        );
        assert_eq!(cpu.r(0), 8);
        assert_eq!(cpu.r(2), 4 + 12);
        assert_eq!(bus.sleeps(), 1);
    }

    #[test]
    fn movs_pc_restores_cpsr() {
        let (cpu, _) = run(&[0xE1B0_F00E], |cpu, _| {
            cpu.registers_mut()
                .set_spsr(crate::Psr::from_word(0x6000_0010));
            cpu.set_r(14, 0x100);
        });
        assert_eq!(cpu.registers().mode(), MODE_USER);
        assert_eq!(flags(&cpu), (false, true, true, false));
        assert_eq!(cpu.r(15), 0x100);
        assert!(cpu.pipeline().reload);
    }

    #[test]
    fn branches() {
        // b . (to itself)
        let (cpu, _) = run(&[0xEAFF_FFFE], |_, _| {});
        assert_eq!(cpu.r(15), 0);

        // bx r0 into Thumb
        let (mut cpu, mut bus) = run(&[0xE12F_FF10], |cpu, _| cpu.set_r(0, 0x101));
        assert!(cpu.registers().cpsr().thumb());
        cpu.instruction(&mut bus);
        assert_eq!(cpu.pipeline().execute.address, 0x100);
        assert!(cpu.pipeline().execute.thumb);
    }

    #[test]
    fn single_transfers() {
        // ldr r1, [r0, #4]!
        let (cpu, _) = run(&[0xE5B0_1004], |cpu, bus| {
            bus.write32(0x204, 0xCAFE_BABE);
            cpu.set_r(0, 0x200);
        });
        assert_eq!((cpu.r(0), cpu.r(1)), (0x204, 0xCAFE_BABE));

        // ldr r1, [r0], r2, lsl #2
        let (cpu, _) = run(&[0xE690_1102], |cpu, bus| {
            bus.write32(0x200, 0x1234_5678);
            cpu.set_r(0, 0x200);
            cpu.set_r(2, 4);
        });
        assert_eq!((cpu.r(0), cpu.r(1)), (0x210, 0x1234_5678));

        // str pc, [r0]
        let (_, bus) = run(&[0xE580_F000], |cpu, _| cpu.set_r(0, 0x300));
        assert_eq!(bus.read32(0x300), 12);

        // ldrb r1, [r0, #3]
        let (cpu, _) = run(&[0xE5D0_1003], |cpu, bus| {
            bus.write32(0x200, 0x8877_6655);
            cpu.set_r(0, 0x200);
        });
        assert_eq!(cpu.r(1), 0x88);
    }

    #[test]
    fn load_takes_one_internal_cycle() {
        let (_, bus) = run(&[0xE590_1000], |cpu, _| cpu.set_r(0, 0x200));
        assert_eq!(bus.sleeps(), 1);
        assert_eq!(
            bus.data_events(),
            vec![Event::Get(
                Access::WORD | Access::LOAD | Access::NONSEQUENTIAL,
                0x200
            )]
        );
    }

    #[test]
    fn halfword_and_signed_transfers() {
        let setup = |cpu: &mut Cpu, bus: &mut TestBus| {
            bus.write32(0x200, 0x8001_FF80);
            cpu.set_r(0, 0x200);
            cpu.set_r(1, 0xABCD_1234);
        };

        // ldrh r1, [r0, #2]
        let (cpu, _) = run(&[0xE1D0_10B2], setup);
        assert_eq!(cpu.r(1), 0x8001);
        // ldrsb r1, [r0, #0]
        let (cpu, _) = run(&[0xE1D0_10D0], setup);
        assert_eq!(cpu.r(1), 0xFFFF_FF80);
        // ldrsh r1, [r0, #2]
        let (cpu, _) = run(&[0xE1D0_10F2], setup);
        assert_eq!(cpu.r(1), 0xFFFF_8001);
        // strh r1, [r0, #-2]!
        let (cpu, bus) = run(&[0xE160_10B2], setup);
        assert_eq!(cpu.r(0), 0x1FE);
        assert_eq!(bus.read16(0x1FE), 0x1234);
    }

    #[test]
    fn signed_store_encodings_are_undefined() {
        // strd-shaped encoding on ARMv4
        let (cpu, _) = run(&[0xE1C0_20F0], |_, _| {});
        assert_eq!(cpu.registers().mode(), MODE_UNDEFINED);
    }

    #[test]
    fn swap_is_locked() {
        // swp r2, r1, [r0]
        let (cpu, bus) = run(&[0xE100_2091], |cpu, bus| {
            bus.write32(0x200, 0x1111_1111);
            cpu.set_r(0, 0x200);
            cpu.set_r(1, 0x2222_2222);
        });
        assert_eq!(cpu.r(2), 0x1111_1111);
        assert_eq!(bus.read32(0x200), 0x2222_2222);
        assert_eq!(
            bus.data_events(),
            vec![
                Event::Lock,
                Event::Get(Access::WORD | Access::LOAD | Access::NONSEQUENTIAL, 0x200),
                Event::Set(
                    Access::WORD | Access::STORE | Access::NONSEQUENTIAL,
                    0x200,
                    0x2222_2222
                ),
                Event::Unlock,
            ]
        );
        assert_eq!(bus.sleeps(), 1);
    }

    #[test]
    fn push_and_pop_with_stm_ldm() {
        // stmdb sp!, {r0-r3, lr}
        let (cpu, bus) = run(&[0xE92D_400F], |cpu, _| {
            for i in 0..4 {
                cpu.set_r(i, 0x10 + i as u32);
            }
            cpu.set_r(13, 0x1000);
            cpu.set_r(14, 0xAAAA);
        });
        assert_eq!(cpu.r(13), 0xFEC);
        let stored: Vec<_> = (0..5).map(|i| bus.read32(0xFEC + i * 4)).collect();
        assert_eq!(stored, vec![0x10, 0x11, 0x12, 0x13, 0xAAAA]);

        let cycles: Vec<_> = bus
            .data_events()
            .into_iter()
            .map(|e| match e {
                Event::Set(access, ..) => access,
                e => panic!("unexpected {e:?}"),
            })
            .collect();
        let mut expected = vec![Access::WORD | Access::NONSEQUENTIAL];
        expected.extend([Access::WORD | Access::SEQUENTIAL; 4]);
        assert_eq!(cycles, expected);

        // ldmia r0!, {r1, r2}
        let (cpu, bus) = run(&[0xE8B0_0006], |cpu, bus| {
            bus.load_words(0x200, &[7, 9]);
            cpu.set_r(0, 0x200);
        });
        assert_eq!((cpu.r(0), cpu.r(1), cpu.r(2)), (0x208, 7, 9));
        assert_eq!(bus.sleeps(), 1);
    }

    #[test]
    fn block_transfer_corner_cases() {
        // stmia r0!, {} transfers r15 and moves the base by 0x40
        let (cpu, bus) = run(&[0xE8A0_0000], |cpu, _| cpu.set_r(0, 0x200));
        assert_eq!(cpu.r(0), 0x240);
        assert_eq!(bus.read32(0x200), 12);

        // ldmia r0!, {r0, r1}: the loaded base wins
        let (cpu, _) = run(&[0xE8B0_0003], |cpu, bus| {
            bus.load_words(0x200, &[0x5555, 0x6666]);
            cpu.set_r(0, 0x200);
        });
        assert_eq!((cpu.r(0), cpu.r(1)), (0x5555, 0x6666));

        // stmia r1!, {r0, r1}: the second store sees the written-back base
        let (cpu, bus) = run(&[0xE8A1_0003], |cpu, _| {
            cpu.set_r(0, 0x77);
            cpu.set_r(1, 0x100);
        });
        assert_eq!(cpu.r(1), 0x108);
        assert_eq!((bus.read32(0x100), bus.read32(0x104)), (0x77, 0x108));

        // stmda r0, {r1, r2}
        let (_, bus) = run(&[0xE800_0006], |cpu, _| {
            cpu.set_r(0, 0x200);
            cpu.set_r(1, 1);
            cpu.set_r(2, 2);
        });
        assert_eq!((bus.read32(0x1FC), bus.read32(0x200)), (1, 2));

        // ldmib r0, {r1}
        let (cpu, _) = run(&[0xE990_0002], |cpu, bus| {
            bus.write32(0x204, 0x4242);
            cpu.set_r(0, 0x200);
        });
        assert_eq!(cpu.r(1), 0x4242);
    }

    #[test]
    fn user_bank_transfer() {
        // stmia r0, {r8}^ from FIQ mode stores the user r8
        let (_, bus) = run(&[0xE8C0_0100], |cpu, _| {
            cpu.set_r(8, 0x11);
            cpu.set_r(0, 0x200);
            cpu.registers_mut().set_mode(MODE_FIQ);
            cpu.set_r(8, 0x22);
        });
        assert_eq!(bus.read32(0x200), 0x11);

        // ldmia r0, {r8}^ from FIQ mode loads the user r8
        let (mut cpu, _) = run(&[0xE8D0_0100], |cpu, bus| {
            bus.write32(0x200, 0x77);
            cpu.set_r(8, 0x11);
            cpu.set_r(0, 0x200);
            cpu.registers_mut().set_mode(MODE_FIQ);
            cpu.set_r(8, 0x22);
        });
        assert_eq!(cpu.registers().mode(), MODE_FIQ);
        assert_eq!(cpu.r(8), 0x22);
        assert_eq!(cpu.r(0), 0x200);
        cpu.registers_mut().set_mode(MODE_USER);
        assert_eq!(cpu.r(8), 0x77);

        // ldmia r0, {pc}^ returns from the exception
        let (cpu, _) = run(&[0xE8D0_8000], |cpu, bus| {
            bus.write32(0x200, 0x400);
            cpu.set_r(0, 0x200);
            cpu.registers_mut()
                .set_spsr(crate::Psr::from_word(0x8000_001F));
        });
        assert_eq!(cpu.r(15), 0x400);
        assert_eq!(cpu.registers().mode(), MODE_SYSTEM);
        assert!(cpu.registers().cpsr().n());
    }

    #[test]
    fn status_transfers() {
        // msr cpsr_c, #0x1F; mrs r0, cpsr; mrs r1, spsr
        let (cpu, _) = run(&[0xE321_F01F, 0xE10F_0000, 0xE14F_1000], |_, _| {});
        assert_eq!(cpu.registers().mode(), MODE_SYSTEM);
        assert_eq!(cpu.r(0), 0x0000_001F);
        // System has no SPSR: reads the CPSR
        assert_eq!(cpu.r(1), 0x0000_001F);

        // msr cpsr_fc, r0 from User only reaches the flags
        let (cpu, _) = run(&[0xE129_F000], |cpu, _| {
            cpu.cpsr().set_fields(0b0001, 0x10);
            cpu.set_r(0, 0xF000_001F);
        });
        assert_eq!(cpu.registers().mode(), MODE_USER);
        assert_eq!(flags(&cpu), (true, true, true, true));

        // msr spsr_f, r0 in Supervisor
        let (cpu, _) = run(&[0xE168_F000], |cpu, _| cpu.set_r(0, 0x4000_0000));
        assert!(cpu.registers().spsr().z());
        assert!(!cpu.registers().cpsr().z());

        // setting T through msr advances the raw pc by a halfword
        let (cpu, _) = run(&[0xE321_F033], |_, _| {});
        assert!(cpu.registers().cpsr().thumb());
        assert_eq!(cpu.registers().pc(), 10);
    }

    #[test]
    fn multiply_results_and_timing() {
        // mul r0, r1, r2
        let (cpu, bus) = run(&[0xE000_0291], |cpu, _| {
            cpu.set_r(1, 6);
            cpu.set_r(2, 7);
        });
        assert_eq!(cpu.r(0), 42);
        assert_eq!(bus.sleeps(), 1);

        let mul_cycles = |rs: u32| {
            let (_, bus) = run(&[0xE000_0291], |cpu, _| cpu.set_r(2, rs));
            bus.sleeps()
        };
        assert_eq!(mul_cycles(0x0000_1234), 2);
        assert_eq!(mul_cycles(0x0012_3456), 3);
        assert_eq!(mul_cycles(0x1234_5678), 4);
        assert_eq!(mul_cycles(0xFFFF_FFF0), 1);

        // mlas r0, r1, r2, r3
        let (cpu, bus) = run(&[0xE030_3291], |cpu, _| {
            cpu.set_r(1, 2);
            cpu.set_r(2, 3);
            cpu.set_r(3, (-6i32) as u32);
        });
        assert_eq!(cpu.r(0), 0);
        assert!(cpu.registers().cpsr().z());
        assert_eq!(bus.sleeps(), 2);

        // umull r0, r1, r2, r3
        let (cpu, bus) = run(&[0xE081_0392], |cpu, _| {
            cpu.set_r(2, 0xFFFF_FFFF);
            cpu.set_r(3, 2);
        });
        assert_eq!((cpu.r(0), cpu.r(1)), (0xFFFF_FFFE, 1));
        assert_eq!(bus.sleeps(), 2);

        // smull r0, r1, r2, r3
        let (cpu, bus) = run(&[0xE0C1_0392], |cpu, _| {
            cpu.set_r(2, 0xFFFF_FFFF);
            cpu.set_r(3, 0x0100_0000);
        });
        assert_eq!((cpu.r(0), cpu.r(1)), (0xFF00_0000, 0xFFFF_FFFF));
        assert_eq!(bus.sleeps(), 5);

        // umlals r0, r1, r2, r3
        let (cpu, bus) = run(&[0xE0B1_0392], |cpu, _| {
            cpu.set_r(0, 0xFFFF_FFFF);
            cpu.set_r(1, 0x7FFF_FFFF);
            cpu.set_r(2, 1);
            cpu.set_r(3, 1);
        });
        assert_eq!((cpu.r(0), cpu.r(1)), (0, 0x8000_0000));
        assert!(cpu.registers().cpsr().n());
        assert_eq!(bus.sleeps(), 3);
    }

    #[test]
    fn multiply_into_pc_is_dropped() {
        // mul pc, r1, r2
        let (cpu, _) = run(&[0xE00F_0291], |cpu, _| {
            cpu.set_r(1, 2);
            cpu.set_r(2, 2);
        });
        assert_eq!(cpu.r(15), 8);
        assert!(!cpu.pipeline().reload);
    }

    #[test]
    fn software_interrupt_from_user() {
        let (cpu, _) = run(&[0xEF00_0042], |cpu, _| {
            cpu.cpsr().set_fields(0b1001, 0x2000_0010);
        });
        assert_eq!(cpu.registers().mode(), MODE_SUPERVISOR);
        assert_eq!(cpu.r(15), VECTOR_SOFTWARE_INTERRUPT);
        assert_eq!(cpu.r(14), 4);
        assert_eq!(u32::from(cpu.registers().spsr()), 0x2000_0010);
        assert!(cpu.registers().cpsr().irq_disable());
    }
}
