//! Coprocessor ports. The core owns no coprocessors; the host binds one closure
//! per operation kind and coprocessor number.

use crate::{cpu::Cpu, Error};

/// Operands of `CDP`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DataProcessing {
    pub op1: u8,
    pub cn: u8,
    pub cd: u8,
    pub cm: u8,
    pub op2: u8,
}

/// Operands of `MCR` / `MRC`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RegisterTransfer {
    pub op1: u8,
    pub cn: u8,
    pub cm: u8,
    pub op2: u8,
}

pub type DataProcessingHook = Box<dyn FnMut(DataProcessing)>;
pub type MoveToCoprocessorHook = Box<dyn FnMut(RegisterTransfer, u32)>;
pub type MoveFromCoprocessorHook = Box<dyn FnMut(RegisterTransfer) -> u32>;

const COPROCESSORS: usize = 16;

#[derive(Default)]
pub(crate) struct Coprocessors {
    pub data_processing: [Option<DataProcessingHook>; COPROCESSORS],
    pub move_to: [Option<MoveToCoprocessorHook>; COPROCESSORS],
    pub move_from: [Option<MoveFromCoprocessorHook>; COPROCESSORS],
}

fn slot(id: u8) -> Result<usize, Error> {
    let ix = id as usize;
    if ix < COPROCESSORS {
        Ok(ix)
    } else {
        Err(Error::InvalidCoprocessor(id))
    }
}

impl Cpu {
    pub fn bind_data_processing(
        &mut self,
        id: u8,
        hook: impl FnMut(DataProcessing) + 'static,
    ) -> Result<(), Error> {
        self.coprocessor.data_processing[slot(id)?] = Some(Box::new(hook));
        Ok(())
    }

    pub fn bind_move_to_coprocessor(
        &mut self,
        id: u8,
        hook: impl FnMut(RegisterTransfer, u32) + 'static,
    ) -> Result<(), Error> {
        self.coprocessor.move_to[slot(id)?] = Some(Box::new(hook));
        Ok(())
    }

    pub fn bind_move_from_coprocessor(
        &mut self,
        id: u8,
        hook: impl FnMut(RegisterTransfer) -> u32 + 'static,
    ) -> Result<(), Error> {
        self.coprocessor.move_from[slot(id)?] = Some(Box::new(hook));
        Ok(())
    }

    /// Drops every bound hook for coprocessor `id`.
    pub fn unbind_coprocessor(&mut self, id: u8) -> Result<(), Error> {
        let ix = slot(id)?;
        self.coprocessor.data_processing[ix] = None;
        self.coprocessor.move_to[ix] = None;
        self.coprocessor.move_from[ix] = None;
        Ok(())
    }
}
