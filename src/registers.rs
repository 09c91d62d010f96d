use modular_bitfield::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Program status register.
///
/// Bit 4 of the mode field is hardwired to one, so every value written through
/// [`Psr::set_fields`] lands in `0x10..=0x1F` even when the low bits name no
/// architectural mode.
#[bitfield]
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Psr {
    pub mode: B5,
    pub thumb: bool,
    pub fiq_disable: bool,
    pub irq_disable: bool,
    #[skip]
    __: B20,
    pub v: bool,
    pub c: bool,
    pub z: bool,
    pub n: bool,
}

impl Default for Psr {
    fn default() -> Self {
        Psr::new().with_mode(MODE_USER)
    }
}

impl Psr {
    /// `MSR`-style partial update. Bit 0 of `field` selects the control byte,
    /// bit 3 the flag byte; the status and extension bytes do not exist on ARMv4.
    pub fn set_fields(&mut self, field: u8, data: u32) {
        if field & 0b0001 != 0 {
            self.set_mode((data & 0x1F) as u8 | 0x10);
            self.set_thumb(data & (1 << 5) != 0);
            self.set_fiq_disable(data & (1 << 6) != 0);
            self.set_irq_disable(data & (1 << 7) != 0);
        }
        if field & 0b1000 != 0 {
            self.set_v(data & (1 << 28) != 0);
            self.set_c(data & (1 << 29) != 0);
            self.set_z(data & (1 << 30) != 0);
            self.set_n(data & (1 << 31) != 0);
        }
    }

    pub fn from_word(data: u32) -> Self {
        let mut ret = Psr::default();
        ret.set_fields(0b1001, data);
        ret
    }

    pub fn set_nz(&mut self, v: u32) {
        self.set_n(v >> 31 != 0);
        self.set_z(v == 0);
    }
}

/// Where a logical register number lands for the current mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Reg {
    Gpr(usize),
    /// r15. Hosts write it through [`Cpu::set_r`](crate::Cpu::set_r), which also
    /// schedules a pipeline reload.
    Pc,
    /// r13/r14 of a mode with no bank. Reads as zero, ignores writes.
    Null,
}

const PC: usize = 15;

#[derive(Clone, Serialize, Deserialize)]
pub struct Registers {
    // 0-15: user, 16-22: fiq r8-r14, 23-30: svc/abt/irq/und r13-r14
    gprs: [u32; 31],
    cpsr: Psr,
    // fiq, svc, abt, irq, und
    spsrs: [Psr; 5],
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            gprs: [0; 31],
            cpsr: Psr::default(),
            spsrs: [Psr::default(); 5],
        }
    }
}

fn reg_bank(mode: u8) -> Option<(&'static [usize; 15], Option<usize>)> {
    const GPRS: [[usize; 15]; 6] = [
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14],
        [0, 1, 2, 3, 4, 5, 6, 7, 16, 17, 18, 19, 20, 21, 22],
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 23, 24],
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 25, 26],
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 27, 28],
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 29, 30],
    ];

    const SPSRS: [Option<usize>; 6] = [None, Some(0), Some(1), Some(2), Some(3), Some(4)];

    let ix = match mode {
        MODE_USER | MODE_SYSTEM => 0,
        MODE_FIQ => 1,
        MODE_SUPERVISOR => 2,
        MODE_ABORT => 3,
        MODE_IRQ => 4,
        MODE_UNDEFINED => 5,
        _ => return None,
    };

    Some((&GPRS[ix], SPSRS[ix]))
}

impl Registers {
    pub fn resolve(&self, index: u8) -> Reg {
        let index = (index & 0xF) as usize;
        if index == PC {
            return Reg::Pc;
        }
        match reg_bank(self.cpsr.mode()) {
            Some((gprs, _)) => Reg::Gpr(gprs[index]),
            None if index < 13 => Reg::Gpr(index),
            None => Reg::Null,
        }
    }

    pub fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Gpr(i) => self.gprs[i],
            Reg::Pc => self.gprs[PC],
            Reg::Null => 0,
        }
    }

    pub(crate) fn write(&mut self, reg: Reg, data: u32) {
        match reg {
            Reg::Gpr(i) => self.gprs[i] = data,
            Reg::Pc => self.gprs[PC] = data,
            Reg::Null => {}
        }
    }

    pub fn r(&self, index: u8) -> u32 {
        self.read(self.resolve(index))
    }

    /// Raw program counter, bypassing the reload side effect.
    pub fn pc(&self) -> u32 {
        self.gprs[PC]
    }

    pub(crate) fn pc_mut(&mut self) -> &mut u32 {
        &mut self.gprs[PC]
    }

    pub fn cpsr(&self) -> &Psr {
        &self.cpsr
    }

    pub fn cpsr_mut(&mut self) -> &mut Psr {
        &mut self.cpsr
    }

    pub fn mode(&self) -> u8 {
        self.cpsr.mode()
    }

    /// Switches the mode field alone; the banked view follows immediately.
    pub(crate) fn set_mode(&mut self, mode: u8) {
        self.cpsr.set_mode(mode & 0x1F);
    }

    /// The SPSR of the current mode, or an all-clear User PSR when the mode has none.
    pub fn spsr(&self) -> Psr {
        match reg_bank(self.cpsr.mode()).and_then(|(_, spsr)| spsr) {
            Some(ix) => self.spsrs[ix],
            None => Psr::default(),
        }
    }

    pub fn set_spsr(&mut self, psr: Psr) {
        if let Some(ix) = reg_bank(self.cpsr.mode()).and_then(|(_, spsr)| spsr) {
            self.spsrs[ix] = psr;
        }
    }

    pub fn set_spsr_fields(&mut self, field: u8, data: u32) {
        let mut spsr = self.spsr();
        spsr.set_fields(field, data);
        self.set_spsr(spsr);
    }

    pub fn privileged(&self) -> bool {
        self.cpsr.mode() != MODE_USER
    }

    /// Privileged and not System: the modes that own an SPSR to return through.
    pub fn in_exception(&self) -> bool {
        self.privileged() && self.cpsr.mode() != MODE_SYSTEM
    }

    pub fn has_spsr(&self) -> bool {
        let mode = self.cpsr.mode();
        mode != MODE_USER && mode != MODE_SYSTEM
    }
}
