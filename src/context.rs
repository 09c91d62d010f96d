use crate::{memory::Access, util::trait_alias};

pub trait Bus {
    fn get(&mut self, access: Access, addr: u32) -> u32;
    fn set(&mut self, access: Access, addr: u32, data: u32);

    /// Brackets the read and write halves of `SWP`.
    fn lock(&mut self) {}
    fn unlock(&mut self) {}
}

pub trait Clock {
    fn step(&mut self, clocks: u32);

    /// One internal cycle with no bus activity.
    fn sleep(&mut self) {
        self.step(1)
    }
}

trait_alias!(pub trait Context = Bus + Clock);
