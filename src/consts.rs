pub const MODE_USER: u8 = 0b10000;
pub const MODE_FIQ: u8 = 0b10001;
pub const MODE_IRQ: u8 = 0b10010;
pub const MODE_SUPERVISOR: u8 = 0b10011;
pub const MODE_ABORT: u8 = 0b10111;
pub const MODE_UNDEFINED: u8 = 0b11011;
pub const MODE_SYSTEM: u8 = 0b11111;

pub const VECTOR_RESET: u32 = 0x00000000;
pub const VECTOR_UNDEFINED: u32 = 0x00000004;
pub const VECTOR_SOFTWARE_INTERRUPT: u32 = 0x00000008;
pub const VECTOR_PREFETCH_ABORT: u32 = 0x0000000C;
pub const VECTOR_DATA_ABORT: u32 = 0x00000010;
pub const VECTOR_IRQ: u32 = 0x00000018;
pub const VECTOR_FIQ: u32 = 0x0000001C;
