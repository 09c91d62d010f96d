use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::{
    alu::{self, AddResult},
    consts::*,
    context::Context,
    coprocessor::Coprocessors,
    dispatch::{arm_index, arm_table, thumb_table},
    memory::Access,
    registers::{Psr, Reg, Registers},
    Config, Error,
};

/// One pipeline latch.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Stage {
    pub address: u32,
    pub instruction: u32,
    /// Fetched in Thumb state.
    pub thumb: bool,
    /// IRQs were unmasked when this slot was fetched.
    pub irq: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Pipeline {
    pub reload: bool,
    pub nonsequential: bool,
    pub fetch: Stage,
    pub decode: Stage,
    pub execute: Stage,
}

#[derive(Default, Serialize, Deserialize)]
pub struct Cpu {
    pub(crate) regs: Registers,
    pub(crate) pipeline: Pipeline,
    /// Shifter carry-out of the executing instruction.
    pub(crate) carry: bool,
    irq: bool,

    #[serde(skip)]
    pub(crate) opcode: u32,
    #[serde(skip)]
    pub(crate) coprocessor: Coprocessors,
    #[serde(skip)]
    config: Config,
}

impl Cpu {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        // Build both tables up front so the first instruction does not pay for it.
        arm_table();
        thumb_table();

        Cpu {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn irq(&self) -> bool {
        self.irq
    }

    /// Level of the IRQ line, sampled before each instruction.
    pub fn set_irq(&mut self, irq: bool) {
        self.irq = irq;
    }

    pub fn power(&mut self) {
        self.regs = Registers::default();
        self.pipeline = Pipeline::default();
        self.carry = false;
        self.irq = false;
        self.regs.cpsr_mut().set_fiq_disable(true);

        debug!("Power on, reset vector {:08X}", self.config.reset_vector);
        self.exception(MODE_SUPERVISOR, self.config.reset_vector);
    }

    pub fn r(&self, index: u8) -> u32 {
        self.regs.r(index)
    }

    pub fn set_r(&mut self, index: u8, data: u32) {
        let reg = self.regs.resolve(index);
        self.regs.write(reg, data);
        if reg == Reg::Pc {
            self.pipeline.reload = true;
        }
    }

    pub(crate) fn cpsr(&mut self) -> &mut Psr {
        self.regs.cpsr_mut()
    }

    fn fetch_width(&self) -> (u32, Access) {
        if self.regs.cpsr().thumb() {
            (2, Access::HALF)
        } else {
            (4, Access::WORD)
        }
    }

    fn reload(&mut self, ctx: &mut impl Context) {
        let (size, access) = self.fetch_width();
        let mask = !(size - 1);

        self.pipeline.reload = false;
        *self.regs.pc_mut() &= mask;
        self.pipeline.fetch.address = self.regs.pc();
        self.end_burst();
        self.pipeline.fetch.instruction =
            self.read(ctx, Access::PREFETCH | access, self.pipeline.fetch.address);
        self.fetch(ctx);
    }

    fn fetch(&mut self, ctx: &mut impl Context) {
        self.pipeline.execute = self.pipeline.decode;
        self.pipeline.decode = self.pipeline.fetch;
        self.pipeline.decode.thumb = self.regs.cpsr().thumb();
        self.pipeline.decode.irq = !self.regs.cpsr().irq_disable();

        let (size, access) = self.fetch_width();
        let pc = self.regs.pc().wrapping_add(size);
        *self.regs.pc_mut() = pc;
        self.pipeline.fetch.address = pc & !(size - 1);
        self.pipeline.fetch.instruction =
            self.read(ctx, Access::PREFETCH | access, self.pipeline.fetch.address);
    }

    /// Advances the pipeline by one slot and retires the instruction that lands
    /// in the execute latch.
    pub fn instruction(&mut self, ctx: &mut impl Context) {
        if self.pipeline.reload {
            self.reload(ctx);
        }
        self.fetch(ctx);

        if self.irq && self.pipeline.execute.irq {
            self.exception(MODE_IRQ, VECTOR_IRQ);
            if self.pipeline.execute.thumb {
                let reg = self.regs.resolve(14);
                let lr = self.regs.read(reg);
                self.regs.write(reg, lr.wrapping_add(2));
            }
            return;
        }

        let execute = self.pipeline.execute;
        self.opcode = execute.instruction;
        self.carry = self.regs.cpsr().c();

        if log::log_enabled!(log::Level::Trace) && self.config.trace {
            if execute.thumb {
                trace!("{:08X}: {:04X}", execute.address, self.opcode as u16);
            } else {
                trace!("{:08X}: {:08X}", execute.address, self.opcode);
            }
        }

        if !execute.thumb {
            if !alu::check_cond(self.regs.cpsr(), (self.opcode >> 28) as u8) {
                return;
            }
            let instr = arm_table()[arm_index(self.opcode)];
            self.execute_arm(ctx, instr);
        } else {
            let instr = thumb_table()[self.opcode as u16 as usize];
            self.execute_thumb(ctx, instr);
        }
    }

    /// Enters `mode` at `vector`. The return address is the slot in decode.
    pub fn exception(&mut self, mode: u8, vector: u32) {
        let psr = *self.regs.cpsr();
        self.regs.set_mode(mode);
        self.regs.set_spsr(psr);

        let cpsr = self.regs.cpsr_mut();
        cpsr.set_thumb(false);
        if mode == MODE_FIQ {
            cpsr.set_fiq_disable(true);
        }
        cpsr.set_irq_disable(true);

        debug!(
            "Exception: mode {mode:02X}, vector {vector:08X}, return {:08X}",
            self.pipeline.decode.address
        );

        self.set_r(14, self.pipeline.decode.address);
        self.set_r(15, vector);
    }

    fn update_flags(&self) -> bool {
        self.regs.cpsr().thumb() || self.opcode & (1 << 20) != 0
    }

    fn arith(&mut self, res: AddResult) -> u32 {
        if self.update_flags() {
            let cpsr = self.cpsr();
            cpsr.set_v(res.overflow);
            cpsr.set_c(res.carry);
            cpsr.set_nz(res.value);
        }
        res.value
    }

    pub(crate) fn add(&mut self, a: u32, b: u32, c: bool) -> u32 {
        self.arith(alu::add_with_flag(a, b, c))
    }

    pub(crate) fn sub(&mut self, a: u32, b: u32, c: bool) -> u32 {
        self.arith(alu::sub_with_flag(a, b, c))
    }

    /// Logical result: C from the shifter, Z and N from the value.
    pub(crate) fn bit(&mut self, res: u32) -> u32 {
        if self.update_flags() {
            let carry = self.carry;
            let cpsr = self.cpsr();
            cpsr.set_c(carry);
            cpsr.set_nz(res);
        }
        res
    }

    pub(crate) fn mul(
        &mut self,
        ctx: &mut impl Context,
        product: u32,
        multiplicand: u32,
        multiplier: u32,
    ) -> u32 {
        self.idle(ctx);
        for _ in 0..alu::multiplier_cycles(multiplier, true) {
            self.idle(ctx);
        }
        let res = product.wrapping_add(multiplicand.wrapping_mul(multiplier));
        if self.update_flags() {
            self.cpsr().set_nz(res);
        }
        res
    }

    pub(crate) fn shift_immediate(&mut self, shift_type: u8, a: u32, amount: u8) -> u32 {
        let (res, carry) = alu::shift_immediate(shift_type, a, amount, self.carry);
        self.carry = carry;
        res
    }

    pub(crate) fn shift_register(&mut self, shift_type: u8, a: u32, amount: u8) -> u32 {
        let (res, carry) = alu::shift_register(shift_type, a, amount, self.carry);
        self.carry = carry;
        res
    }

    pub(crate) fn ror(&mut self, a: u32, amount: u8) -> u32 {
        let (res, carry) = alu::ror(a, amount, self.carry);
        self.carry = carry;
        res
    }

    pub fn save_state(&self) -> Result<Vec<u8>, Error> {
        bincode::serialize(self).map_err(Error::SerializeFailed)
    }

    /// Restores a snapshot. Coprocessor bindings and the config of `self` are kept.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut state: Cpu = bincode::deserialize(data)?;
        std::mem::swap(&mut state.coprocessor, &mut self.coprocessor);
        std::mem::swap(&mut state.config, &mut self.config);
        *self = state;
        Ok(())
    }
}
