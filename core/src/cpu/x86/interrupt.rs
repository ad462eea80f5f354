//! Interrupt delivery and the device/hypercall bridge (C7).

use log::warn;

use crate::core::host::{DiskSelect, HostInterface, TickEvent};
use crate::core::mem::{Flag, Mem, Reg16};
use crate::cpu::x86::stack::push_return_frame;

/// `pc_interrupt(n)`: push FLAGS/CS/IP, clear TF/IF, vector through `[n*4]`.
pub fn pc_interrupt(mem: &mut Mem, n: u8) {
    push_return_frame(mem);
    mem.set_flag(Flag::Tf, false);
    mem.set_flag(Flag::If, false);
    let vector_addr = (n as usize) * 4;
    let ip = mem.read16(vector_addr);
    let cs = mem.read16(vector_addr + 2);
    mem.set_ip(ip);
    mem.set_reg16(Reg16::Cs, cs);
}

/// Tracks how many instructions have retired since the last INT 8 delivery,
/// to enforce `EngineConfig::int8_rate_limit` (`SPEC_FULL.md` §4.4).
#[derive(Debug, Default)]
pub struct InterruptBridge {
    since_last_int8: u32,
    pub trap_pending: bool,
}

impl InterruptBridge {
    pub fn new() -> InterruptBridge {
        InterruptBridge {
            since_last_int8: u32::MAX / 2,
            trap_pending: false,
        }
    }

    /// Run once per instruction, after flag update, per `SPEC_FULL.md` §4.4.
    /// `prefix_active` suppresses external IRQ delivery while a segment/REP
    /// prefix's target instruction has not yet executed. Returns the host's
    /// tick event plus whether an interrupt was actually vectored this call
    /// (used by `Cpu8086::step` to know whether a `HLT` should wake up).
    pub fn service(
        &mut self,
        mem: &mut Mem,
        host: &mut dyn HostInterface,
        prefix_active: bool,
        int8_rate_limit: u32,
    ) -> (TickEvent, bool) {
        self.since_last_int8 = self.since_last_int8.saturating_add(1);
        let mut delivered = false;

        let event = host.timer_tick(4);
        if event.floppy_changed {
            host.fd_changed();
        }
        if event.exit {
            return (event, delivered);
        }

        if self.trap_pending {
            pc_interrupt(mem, 1);
            delivered = true;
        }
        self.trap_pending = mem.flag(Flag::Tf);

        if !prefix_active && mem.flag(Flag::If) && !mem.flag(Flag::Tf) {
            if let Some(irq) = host.int_pending() {
                let is_timer = irq == 8;
                if !is_timer || self.since_last_int8 >= int8_rate_limit {
                    pc_interrupt(mem, irq);
                    delivered = true;
                    if is_timer {
                        self.since_last_int8 = 0;
                    }
                }
            }
        }

        (event, delivered)
    }
}

/// `0F imm8` hypercall dispatch (`SPEC_FULL.md` §6).
pub fn dispatch_hypercall(mem: &mut Mem, imm8: u8, host: &mut dyn HostInterface) {
    match imm8 {
        0 => host.putchar(mem.reg8(0)),
        1 => {
            let addr = Mem::linear(mem.reg16(Reg16::Es), mem.reg16(Reg16::Bx));
            let bytes = host.read_rtc().to_bytes();
            for (i, b) in bytes.iter().enumerate() {
                mem.write8(addr + i, *b);
            }
        }
        2 => disk_transfer(mem, host, true),
        3 => disk_transfer(mem, host, false),
        other => {
            warn!("unrecognized hypercall 0F {:02X} at {:04X}:{:04X}", other, mem.reg16(Reg16::Cs), mem.ip());
        }
    }
}

fn disk_transfer(mem: &mut Mem, host: &mut dyn HostInterface, is_read: bool) {
    let drive = if mem.reg8(2) == 0 {
        DiskSelect::Hard
    } else {
        DiskSelect::Floppy
    };
    // The 32-bit sector number overlays BP:SI in the register window — the
    // same memory-mapped-register trick that lets PUSH CS and PUSH [mem]
    // share one code path (`core::mem` module docs) lets a hypercall read
    // a 32-bit pseudo-register as two adjacent 16-bit ones.
    let lba = mem.read16(Mem::reg16_offset(Reg16::Bp)) as u32
        | ((mem.read16(Mem::reg16_offset(Reg16::Si)) as u32) << 16);
    let count = mem.reg16(Reg16::Ax) as usize;
    let addr = Mem::linear(mem.reg16(Reg16::Es), mem.reg16(Reg16::Bx));

    let result = if is_read {
        let mut buf = vec![0u8; count];
        let r = host.disk_read(drive, lba, &mut buf);
        if r.is_ok() {
            for (i, b) in buf.iter().enumerate() {
                mem.write8(addr + i, *b);
            }
        }
        r
    } else {
        let mut buf = vec![0u8; count];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = mem.read8(addr + i);
        }
        host.disk_write(drive, lba, &buf)
    };

    mem.set_reg8(0, if result.is_ok() { 0x00 } else { 0xFF });
}

/// Unimplemented/illegal opcode: log and continue at the next byte
/// (`SPEC_FULL.md` §7 — never aborts the host process).
pub fn log_unimplemented(mem: &Mem, opcode: u8) {
    warn!(
        "unimplemented opcode {:02X} at {:04X}:{:04X}",
        opcode,
        mem.reg16(Reg16::Cs),
        mem.ip()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mem::DEFAULT_MEM_SIZE;

    #[test]
    fn pc_interrupt_pushes_frame_and_vectors() {
        let mut mem = Mem::new(DEFAULT_MEM_SIZE);
        mem.set_reg16(Reg16::Cs, 0xF000);
        mem.set_ip(0x0102);
        mem.set_reg16(Reg16::Ss, 0x0000);
        mem.set_reg16(Reg16::Sp, 0x0100);
        mem.set_flags_word(0x0202);
        mem.write16(0x21 * 4, 0xABCD);
        mem.write16(0x21 * 4 + 2, 0x1234);

        pc_interrupt(&mut mem, 0x21);

        assert_eq!(mem.reg16(Reg16::Cs), 0x1234);
        assert_eq!(mem.ip(), 0xABCD);
        assert!(!mem.flag(Flag::If));
        assert!(!mem.flag(Flag::Tf));

        let sp = mem.reg16(Reg16::Sp);
        let base = Mem::linear(0x0000, sp);
        assert_eq!(mem.read16(base), 0x0102); // IP
        assert_eq!(mem.read16(base + 2), 0xF000); // CS
        assert_eq!(mem.read16(base + 4) & 0x0FD5, 0x0202 & 0x0FD5); // FLAGS
    }
}
