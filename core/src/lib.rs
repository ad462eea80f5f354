pub mod core;
pub mod cpu;
pub mod engine;

pub mod prelude {
    pub use crate::core::{Component, DiskSelect, HostInterface, Mem, RtcTime, TickEvent};
    pub use crate::cpu::{Cpu, Cpu8086, DecodeTables};
    pub use crate::engine::{Engine, EngineConfig, ResetError};
}
