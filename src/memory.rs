use bitflags::bitflags;

use crate::{alu, context::Context, cpu::Cpu};

bitflags! {
    /// Bus cycle classification handed to [`Bus::get`](crate::Bus::get) and
    /// [`Bus::set`](crate::Bus::set).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        /// N cycle
        const NONSEQUENTIAL = 1 << 0;
        /// S cycle
        const SEQUENTIAL    = 1 << 1;
        const PREFETCH      = 1 << 2;
        const BYTE          = 1 << 3;
        const HALF          = 1 << 4;
        const WORD          = 1 << 5;
        const LOAD          = 1 << 6;
        const STORE         = 1 << 7;
        const SIGNED        = 1 << 8;
    }
}

impl Cpu {
    pub(crate) fn idle(&mut self, ctx: &mut impl Context) {
        self.pipeline.nonsequential = true;
        ctx.sleep();
    }

    pub(crate) fn end_burst(&mut self) {
        self.pipeline.nonsequential = true;
    }

    fn burst_cycle(&mut self) -> Access {
        if self.pipeline.nonsequential {
            self.pipeline.nonsequential = false;
            Access::NONSEQUENTIAL
        } else {
            Access::SEQUENTIAL
        }
    }

    /// Burst read: instruction fetch and block transfers.
    pub(crate) fn read(&mut self, ctx: &mut impl Context, access: Access, addr: u32) -> u32 {
        let access = access | self.burst_cycle();
        ctx.get(access, addr)
    }

    /// Burst write: block transfers.
    pub(crate) fn write(&mut self, ctx: &mut impl Context, access: Access, addr: u32, data: u32) {
        let access = access | self.burst_cycle();
        ctx.set(access, addr, data)
    }

    /// Single data load, including the internal cycle that latches the result.
    ///
    /// Misaligned addresses are not an error: the word the bus returns is rotated
    /// (or arithmetically shifted for signed loads) by the byte offset.
    pub(crate) fn load(&mut self, ctx: &mut impl Context, access: Access, addr: u32) -> u32 {
        let data = ctx.get(access | Access::LOAD | Access::NONSEQUENTIAL, addr);
        self.pipeline.nonsequential = true;

        let signed = access.contains(Access::SIGNED);
        let (data, ofs) = if access.contains(Access::HALF) {
            let data = if signed {
                data as u16 as i16 as u32
            } else {
                data as u16 as u32
            };
            (data, addr & 1)
        } else if access.contains(Access::BYTE) {
            let data = if signed {
                data as u8 as i8 as u32
            } else {
                data as u8 as u32
            };
            (data, 0)
        } else {
            (data, addr & 3)
        };

        let sft = (ofs * 8) as u8;
        let data = if signed {
            alu::asr(data, sft, false).0
        } else {
            alu::ror(data, sft, false).0
        };

        self.idle(ctx);
        data
    }

    /// Single data store. Narrow values are mirrored over every byte lane.
    pub(crate) fn store(&mut self, ctx: &mut impl Context, access: Access, addr: u32, data: u32) {
        let data = if access.contains(Access::HALF) {
            (data & 0xFFFF) * 0x0001_0001
        } else if access.contains(Access::BYTE) {
            (data & 0xFF) * 0x0101_0101
        } else {
            data
        };
        ctx.set(access | Access::STORE | Access::NONSEQUENTIAL, addr, data);
        self.pipeline.nonsequential = true;
    }
}
