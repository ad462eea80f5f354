//! Single-step test-vector types for the 8086 core.
//!
//! The teacher's per-CPU validation crate traced bus cycles through a generic
//! `Bus`/`BusMaster` abstraction, since its cores had genuinely different
//! address/data widths. This core has exactly one: a flat byte array behind
//! `Mem`, with no cycle-level tracing (`Component::tick` always completes a
//! whole instruction). So a vector here is just a before/after register
//! snapshot plus the sparse set of memory bytes the instruction could see or
//! touch, diffed directly against `Mem` rather than recorded from bus cycles.

use serde::{Deserialize, Serialize};
use xt8086_core::core::mem::{Mem, Reg16};
use xt8086_core::cpu::{Cpu8086State, CpuStateTrait};
use xt8086_core::prelude::*;

/// One single-step fixture: a named instruction, its preconditions, and the
/// state it must produce after exactly one `Engine::step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Xt8086TestCase {
    pub name: String,
    pub initial: Xt8086State,
    #[serde(rename = "final")]
    pub final_state: Xt8086State,
}

/// A register snapshot plus the touched slice of the fuzz arena (see
/// [`ARENA_BASE`]/[`ARENA_LEN`]), as `(linear_addr, byte)` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Xt8086State {
    pub ax: u16,
    pub cx: u16,
    pub dx: u16,
    pub bx: u16,
    pub sp: u16,
    pub bp: u16,
    pub si: u16,
    pub di: u16,
    pub es: u16,
    pub cs: u16,
    pub ss: u16,
    pub ds: u16,
    pub ip: u16,
    pub flags: u16,
    pub ram: Vec<(u32, u8)>,
}

/// Physical base of the arena the generator confines fuzzed instructions
/// and operands to. Chosen well clear of `REGS_BASE` (`0xF0000`) so no
/// combination of segment/offset a generated case can pick will alias the
/// register window.
pub const ARENA_BASE: usize = 0x0000;
pub const ARENA_LEN: usize = 0x2000;

impl Xt8086State {
    /// Read a snapshot out of a live engine: registers via [`Cpu8086State`],
    /// memory as every byte of the arena (dense here; the generator sparsens
    /// it down to the touched set before writing JSON).
    pub fn capture(mem: &Mem, cpu: &Cpu8086) -> Xt8086State {
        let s: Cpu8086State = cpu.snapshot(mem);
        Xt8086State {
            ax: s.ax,
            cx: s.cx,
            dx: s.dx,
            bx: s.bx,
            sp: s.sp,
            bp: s.bp,
            si: s.si,
            di: s.di,
            es: s.es,
            cs: s.cs,
            ss: s.ss,
            ds: s.ds,
            ip: s.ip,
            flags: s.flags,
            ram: (0..ARENA_LEN as u32)
                .map(|off| (off, mem.read8(ARENA_BASE + off as usize)))
                .collect(),
        }
    }

    /// Apply this snapshot's registers and sparse RAM entries to `mem`.
    pub fn install(&self, mem: &mut Mem) {
        mem.set_reg16(Reg16::Ax, self.ax);
        mem.set_reg16(Reg16::Cx, self.cx);
        mem.set_reg16(Reg16::Dx, self.dx);
        mem.set_reg16(Reg16::Bx, self.bx);
        mem.set_reg16(Reg16::Sp, self.sp);
        mem.set_reg16(Reg16::Bp, self.bp);
        mem.set_reg16(Reg16::Si, self.si);
        mem.set_reg16(Reg16::Di, self.di);
        mem.set_reg16(Reg16::Es, self.es);
        mem.set_reg16(Reg16::Cs, self.cs);
        mem.set_reg16(Reg16::Ss, self.ss);
        mem.set_reg16(Reg16::Ds, self.ds);
        mem.set_ip(self.ip);
        mem.set_flags_word(self.flags);
        for &(addr, val) in &self.ram {
            mem.write8(ARENA_BASE + addr as usize, val);
        }
    }
}

/// Keep only the `(addr, val)` pairs that changed between `before` and
/// `after`, so a fixture's final `ram` list stays proportional to what an
/// instruction actually wrote rather than dumping the whole arena twice.
pub fn sparsen(before: &Xt8086State, after: &Xt8086State) -> Vec<(u32, u8)> {
    after
        .ram
        .iter()
        .zip(before.ram.iter())
        .filter_map(|(&(addr, new), &(_, old))| (new != old).then_some((addr, new)))
        .collect()
}

/// Keep only the nonzero `(addr, val)` pairs of a dense snapshot, for an
/// `initial` state where the baseline is a zeroed arena.
pub fn sparsen_nonzero(state: &Xt8086State) -> Vec<(u32, u8)> {
    state.ram.iter().copied().filter(|&(_, val)| val != 0).collect()
}
