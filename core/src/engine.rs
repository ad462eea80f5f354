//! Top-level orchestrator (C8): owns memory, the CPU, and the decode tables,
//! and drives the fetch/decode/dispatch loop against a caller-supplied
//! [`HostInterface`].

use std::fmt;

use log::debug;

use crate::core::component::Component;
use crate::core::host::{DiskSelect, HostInterface};
use crate::core::mem::{Mem, Reg16, DEFAULT_MEM_SIZE};
use crate::cpu::{Cpu, Cpu8086, DecodeTables};

/// Physical offset BIOS images are copied to on reset: `F000:0100`.
const BIOS_LOAD_ADDR: usize = 0xF0100;
/// One byte past the end of the F000 segment.
const BIOS_SEGMENT_END: usize = 0x100000;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Minimum retired instructions between two delivered `INT 8`s
    /// (`SPEC_FULL.md` §4.4, §10). Default matches the distilled spec's own
    /// recommendation of 300.
    pub int8_rate_limit: u32,
    pub mem_size: usize,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            int8_rate_limit: 300,
            mem_size: DEFAULT_MEM_SIZE,
        }
    }
}

/// Errors from [`Engine::reset`]: host/image problems, never guest faults
/// (those vector through `pc_interrupt` and never reach the caller).
#[derive(Debug)]
pub enum ResetError {
    /// The supplied BIOS image doesn't fit in the `F000:0100..=F000:FFFF` window.
    BiosTooLarge { len: usize, max: usize },
}

impl fmt::Display for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetError::BiosTooLarge { len, max } => {
                write!(f, "BIOS image is {len} bytes, but only {max} bytes fit at F000:0100")
            }
        }
    }
}

impl std::error::Error for ResetError {}

/// Ties [`Mem`], [`Cpu8086`], and [`DecodeTables`] together into a runnable
/// machine. The device/interrupt side of the loop is supplied per-call as a
/// `&mut dyn HostInterface` rather than stored, so one `Engine` can be driven
/// by different host implementations (a test double, a real BIOS host) without
/// a generic parameter threading through every method.
pub struct Engine {
    pub mem: Mem,
    pub cpu: Cpu8086,
    pub tables: DecodeTables,
    /// The image last passed to `reset`, retained so a host-requested
    /// runtime reset (`TickEvent::reset_requested`, surfaced by `step` via
    /// `Cpu8086::take_pending_reset`) can redo the full C8 reset — BIOS
    /// reload and boot-vector reseed included — rather than just the CPU's
    /// own register reset.
    boot_image: Vec<u8>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        let mut cpu = Cpu8086::new();
        cpu.set_int8_rate_limit(config.int8_rate_limit);
        Engine {
            mem: Mem::new(config.mem_size),
            cpu,
            tables: DecodeTables::classic(),
            boot_image: Vec::new(),
        }
    }

    /// C8: zero memory, load `bios` at `F000:0100`, seed `AX:CX` with the hard
    /// disk's sector count (zero if absent), and vector the CPU to its boot
    /// state.
    pub fn reset(&mut self, bios: &[u8], host: &dyn HostInterface) -> Result<(), ResetError> {
        let max = BIOS_SEGMENT_END - BIOS_LOAD_ADDR;
        if bios.len() > max {
            return Err(ResetError::BiosTooLarge { len: bios.len(), max });
        }

        for b in self.mem.as_mut_slice().iter_mut() {
            *b = 0;
        }
        self.mem.as_mut_slice()[BIOS_LOAD_ADDR..BIOS_LOAD_ADDR + bios.len()].copy_from_slice(bios);

        let sector_count = host.disk_sector_count(DiskSelect::Hard).unwrap_or(0);
        self.mem.set_reg16(Reg16::Ax, sector_count as u16);
        self.mem.set_reg16(Reg16::Cx, (sector_count >> 16) as u16);

        self.cpu.reset(&mut self.mem);
        self.boot_image = bios.to_vec();
        debug!("reset: loaded {} BIOS bytes, HD sectors = {sector_count}", bios.len());
        Ok(())
    }

    /// Execute a single whole instruction. Returns `false` once the host
    /// signals exit (`SPEC_FULL.md` §7 — `step` is otherwise infallible).
    /// If the host requested a full reset mid-instruction, redo `reset` with
    /// the retained boot image before returning.
    pub fn step(&mut self, host: &mut dyn HostInterface) -> bool {
        let keep_running = self.cpu.tick(&mut self.mem, &self.tables, host);
        if self.cpu.take_pending_reset() {
            let bios = std::mem::take(&mut self.boot_image);
            self.reset(&bios, &*host).expect("retained boot image already fit once");
            self.boot_image = bios;
        }
        keep_running
    }

    /// Run until the host requests exit.
    pub fn run(&mut self, host: &mut dyn HostInterface) {
        while self.step(host) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::{RtcTime, TickEvent};
    use std::io;

    struct NullHost {
        hd_sectors: Option<u32>,
    }

    impl HostInterface for NullHost {
        fn read_port(&mut self, _port: u16) -> u8 {
            0
        }
        fn write_port(&mut self, _port: u16, _value: u8) {}
        fn timer_tick(&mut self, _n: u32) -> TickEvent {
            TickEvent::default()
        }
        fn int_pending(&mut self) -> Option<u8> {
            None
        }
        fn fd_changed(&mut self) {}
        fn putchar(&mut self, _byte: u8) {}
        fn read_rtc(&self) -> RtcTime {
            RtcTime::default()
        }
        fn disk_sector_count(&self, drive: DiskSelect) -> Option<u32> {
            match drive {
                DiskSelect::Hard => self.hd_sectors,
                DiskSelect::Floppy => None,
            }
        }
        fn disk_read(&mut self, _drive: DiskSelect, _lba: u32, _buf: &mut [u8]) -> io::Result<()> {
            Ok(())
        }
        fn disk_write(&mut self, _drive: DiskSelect, _lba: u32, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn reset_loads_bios_and_seeds_boot_vector() {
        let mut engine = Engine::new(EngineConfig::default());
        let host = NullHost { hd_sectors: Some(0x00012345) };
        let bios = [0xB8, 0x34, 0x12]; // MOV AX, 0x1234
        engine.reset(&bios, &host).unwrap();

        assert_eq!(engine.mem.reg16(Reg16::Cs), 0xF000);
        assert_eq!(engine.mem.ip(), 0x0100);
        assert_eq!(engine.mem.reg16(Reg16::Ax), 0x2345);
        assert_eq!(engine.mem.reg16(Reg16::Cx), 0x0001);
        assert_eq!(engine.mem.read8(BIOS_LOAD_ADDR), 0xB8);
    }

    #[test]
    fn reset_rejects_oversized_bios() {
        let mut engine = Engine::new(EngineConfig::default());
        let host = NullHost { hd_sectors: None };
        let huge = vec![0u8; BIOS_SEGMENT_END - BIOS_LOAD_ADDR + 1];
        assert!(engine.reset(&huge, &host).is_err());
    }

    #[test]
    fn step_executes_one_instruction_and_advances_ip() {
        let mut engine = Engine::new(EngineConfig::default());
        let host = NullHost { hd_sectors: None };
        let bios = [0xB8, 0x34, 0x12]; // MOV AX, 0x1234
        engine.reset(&bios, &host).unwrap();
        let mut host = NullHost { hd_sectors: None };
        engine.step(&mut host);
        assert_eq!(engine.mem.reg16(Reg16::Ax), 0x1234);
        assert_eq!(engine.mem.ip(), 0x0103);
    }
}
