mod alu;
mod arm;
mod context;
mod coprocessor;
mod cpu;
mod dispatch;
mod memory;
mod registers;
mod thumb;
mod util;

pub mod consts;

#[cfg(test)]
mod testing;

pub use context::{Bus, Clock, Context};
pub use coprocessor::{
    DataProcessing, DataProcessingHook, MoveFromCoprocessorHook, MoveToCoprocessorHook,
    RegisterTransfer,
};
pub use cpu::{Cpu, Pipeline, Stage};
pub use memory::Access;
pub use registers::{Psr, Reg, Registers};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Default, Clone, JsonSchema, Serialize, Deserialize)]
pub struct Config {
    /// Address the pipeline is refilled from on power-on
    pub reset_vector: u32,
    /// Trace every executed instruction at `trace` level
    pub trace: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("serialize failed: {0}")]
    SerializeFailed(#[source] bincode::Error),
    #[error("deserialize failed: {0}")]
    DeserializeFailed(#[from] bincode::Error),
    #[error("coprocessor id out of range: {0}")]
    InvalidCoprocessor(u8),
}
