pub mod component;
pub mod host;
pub mod mem;

pub use component::Component;
pub use host::{DiskSelect, HostInterface, RtcTime, TickEvent};
pub use mem::{Mem, Reg16, Width};
