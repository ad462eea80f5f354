use std::io;

use xt8086_core::prelude::*;

/// Minimal host for testing: no ports, no disks, a fixed RTC, never asks
/// for an external IRQ.
pub struct TestHost {
    pub hd_sectors: Option<u32>,
    pub pending_irq: Option<u8>,
    pub ports: [u8; 0x10000],
}

impl TestHost {
    pub fn new() -> Self {
        TestHost { hd_sectors: None, pending_irq: None, ports: [0; 0x10000] }
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInterface for TestHost {
    fn read_port(&mut self, port: u16) -> u8 {
        self.ports[port as usize]
    }

    fn write_port(&mut self, port: u16, value: u8) {
        self.ports[port as usize] = value;
    }

    fn timer_tick(&mut self, _n: u32) -> TickEvent {
        TickEvent::default()
    }

    fn int_pending(&mut self) -> Option<u8> {
        self.pending_irq.take()
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

/// Build an `Engine` with `program` loaded as the BIOS image (so it lands at
/// `F000:0100`, the reset vector) and take one step per instruction byte
/// sequence the caller cares about.
pub fn booted_engine(program: &[u8]) -> (Engine, TestHost) {
    let mut engine = Engine::new(EngineConfig::default());
    let host = TestHost::new();
    engine.reset(program, &host).unwrap();
    (engine, host)
}
