//! In-crate bus model for unit tests.

use crate::{
    context::{Bus, Clock},
    memory::Access,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
    Get(Access, u32),
    Set(Access, u32, u32),
    Sleep,
    Lock,
    Unlock,
}

/// 64 KiB of little-endian memory, mirrored over the whole address space.
pub struct TestBus {
    mem: Vec<u8>,
    pub events: Vec<Event>,
    pub clocks: u64,
}

const MEM_SIZE: usize = 0x10000;

impl TestBus {
    pub fn new() -> Self {
        Self {
            mem: vec![0; MEM_SIZE],
            events: vec![],
            clocks: 0,
        }
    }

    fn ix(addr: u32) -> usize {
        addr as usize & (MEM_SIZE - 1)
    }

    pub fn read8(&self, addr: u32) -> u8 {
        self.mem[Self::ix(addr)]
    }

    pub fn read16(&self, addr: u32) -> u16 {
        let addr = addr & !1;
        u16::from_le_bytes([self.read8(addr), self.read8(addr + 1)])
    }

    pub fn read32(&self, addr: u32) -> u32 {
        let addr = addr & !3;
        self.read16(addr) as u32 | (self.read16(addr + 2) as u32) << 16
    }

    pub fn write8(&mut self, addr: u32, data: u8) {
        self.mem[Self::ix(addr)] = data;
    }

    pub fn write16(&mut self, addr: u32, data: u16) {
        let addr = addr & !1;
        let [lo, hi] = data.to_le_bytes();
        self.write8(addr, lo);
        self.write8(addr + 1, hi);
    }

    pub fn write32(&mut self, addr: u32, data: u32) {
        let addr = addr & !3;
        self.write16(addr, data as u16);
        self.write16(addr + 2, (data >> 16) as u16);
    }

    pub fn load_words(&mut self, addr: u32, words: &[u32]) {
        for (i, &w) in words.iter().enumerate() {
            self.write32(addr + i as u32 * 4, w);
        }
    }

    pub fn load_halves(&mut self, addr: u32, halves: &[u16]) {
        for (i, &h) in halves.iter().enumerate() {
            self.write16(addr + i as u32 * 2, h);
        }
    }

    pub fn sleeps(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Sleep).count()
    }

    /// Everything but prefetches and sleeps.
    pub fn data_events(&self) -> Vec<Event> {
        self.events
            .iter()
            .copied()
            .filter(|e| match e {
                Event::Get(access, _) => !access.contains(Access::PREFETCH),
                Event::Sleep => false,
                _ => true,
            })
            .collect()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }
}

impl Bus for TestBus {
    fn get(&mut self, access: Access, addr: u32) -> u32 {
        self.events.push(Event::Get(access, addr));
        if access.contains(Access::BYTE) {
            self.read8(addr) as u32
        } else if access.contains(Access::HALF) {
            self.read16(addr) as u32
        } else {
            self.read32(addr)
        }
    }

    fn set(&mut self, access: Access, addr: u32, data: u32) {
        self.events.push(Event::Set(access, addr, data));
        if access.contains(Access::BYTE) {
            self.write8(addr, data as u8);
        } else if access.contains(Access::HALF) {
            self.write16(addr, data as u16);
        } else {
            self.write32(addr, data);
        }
    }

    fn lock(&mut self) {
        self.events.push(Event::Lock);
    }

    fn unlock(&mut self) {
        self.events.push(Event::Unlock);
    }
}

impl Clock for TestBus {
    fn step(&mut self, clocks: u32) {
        self.clocks += clocks as u64;
    }

    fn sleep(&mut self) {
        self.events.push(Event::Sleep);
        self.step(1);
    }
}
