//! Control flow: Jcc, LOOP family, JCXZ, JMP/CALL near/far/short, RET family.

use crate::core::mem::{Mem, Reg16};

pub fn jmp_short(mem: &mut Mem, rel8: i8) {
    let ip = mem.ip().wrapping_add(rel8 as i16 as u16);
    mem.set_ip(ip);
}

pub fn jmp_near(mem: &mut Mem, rel16: i16) {
    let ip = mem.ip().wrapping_add(rel16 as u16);
    mem.set_ip(ip);
}

pub fn jmp_far(mem: &mut Mem, cs: u16, ip: u16) {
    mem.set_reg16(Reg16::Cs, cs);
    mem.set_ip(ip);
}

/// LOOP/LOOPE/LOOPNE: decrement CX, jump if CX != 0 and (no condition, or
/// ZF matches the requested sense).
pub fn loop_instr(mem: &mut Mem, rel8: i8, zero_condition: Option<bool>) {
    let cx = mem.reg16(Reg16::Cx).wrapping_sub(1);
    mem.set_reg16(Reg16::Cx, cx);
    let take = cx != 0
        && match zero_condition {
            None => true,
            Some(want_zero) => mem.flag(crate::core::mem::Flag::Zf) == want_zero,
        };
    if take {
        jmp_short(mem, rel8);
    }
}

/// JCXZ: jump if CX == 0.
pub fn jcxz(mem: &mut Mem, rel8: i8) {
    if mem.reg16(Reg16::Cx) == 0 {
        jmp_short(mem, rel8);
    }
}
