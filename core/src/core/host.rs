//! The device interface consumed by the interrupt & device bridge (C7).
//!
//! Everything platform-specific — video/keyboard/timer emulation, disk image
//! files, the RTC source — lives behind this trait (`SPEC_FULL.md` §1, §6).
//! The engine only ever calls back through `HostInterface`; it never owns a
//! file handle or a window.

use std::io;

/// Which disk a hypercall or port operation addresses (`DL` register: 0=HD, 1=FD).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiskSelect {
    Hard,
    Floppy,
}

/// Result of polling the host once per instruction (`HostInterface::timer_tick`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TickEvent {
    /// The host wants the engine to stop (`ExitEmulation`).
    pub exit: bool,
    /// The floppy image changed out from under the engine (`FDChanged`).
    pub floppy_changed: bool,
    /// The host wants a full reset (`Reset`).
    pub reset_requested: bool,
}

/// `GET_RTC` hypercall payload: a little-endian `struct tm`-like record plus
/// milliseconds, matching `SPEC_FULL.md` §6.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RtcTime {
    pub sec: i32,
    pub min: i32,
    pub hour: i32,
    pub mday: i32,
    pub mon: i32,
    pub year: i32,
    pub wday: i32,
    pub yday: i32,
    pub isdst: i32,
    pub millitm: u16,
}

impl RtcTime {
    /// Serialize as the 38-byte wire layout the hypercall writes to guest memory:
    /// nine little-endian i32s followed by a little-endian u16.
    pub fn to_bytes(self) -> [u8; 38] {
        let mut buf = [0u8; 38];
        let fields = [
            self.sec, self.min, self.hour, self.mday, self.mon, self.year, self.wday, self.yday,
            self.isdst,
        ];
        for (i, f) in fields.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&f.to_le_bytes());
        }
        buf[36..38].copy_from_slice(&self.millitm.to_le_bytes());
        buf
    }
}

/// Capability object the engine polls/delegates to once per instruction.
///
/// Implementations are platform code (a real PC/XT front end, or a test
/// double); the engine never re-enters itself from within these calls
/// (`SPEC_FULL.md` §5).
pub trait HostInterface {
    /// Port-mapped I/O read (`IN`).
    fn read_port(&mut self, port: u16) -> u8;
    /// Port-mapped I/O write (`OUT`).
    fn write_port(&mut self, port: u16, value: u8);

    /// Advance the host's notion of time by `n` (implementation-defined)
    /// units and report any pending platform event.
    fn timer_tick(&mut self, n: u32) -> TickEvent;

    /// Consume and return the next pending hardware IRQ number, if any.
    fn int_pending(&mut self) -> Option<u8>;

    /// Called once when `timer_tick`'s `TickEvent::floppy_changed` reports
    /// the floppy image changed out from under the engine, so the host can
    /// re-read geometry/sector count before the next disk hypercall.
    fn fd_changed(&mut self);

    /// `PUTCHAR_AL` hypercall: write one byte to the host console.
    fn putchar(&mut self, byte: u8);

    /// `GET_RTC` hypercall: current wall-clock time.
    fn read_rtc(&self) -> RtcTime;

    /// Sector count for the given disk, if one is attached.
    fn disk_sector_count(&self, drive: DiskSelect) -> Option<u32>;

    /// `DISK_READ` hypercall: read `buf.len()` bytes starting at sector `lba`.
    fn disk_read(&mut self, drive: DiskSelect, lba: u32, buf: &mut [u8]) -> io::Result<()>;

    /// `DISK_WRITE` hypercall: write `buf` starting at sector `lba`.
    fn disk_write(&mut self, drive: DiskSelect, lba: u32, buf: &[u8]) -> io::Result<()>;
}
