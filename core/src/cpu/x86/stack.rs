//! Stack mechanics: PUSH/POP, PUSHA/POPA, PUSHF/POPF/SAHF/LAHF, ENTER/LEAVE.
//!
//! Every push/pop goes through these two primitives so CS/flags/general
//! registers and a plain memory word share one code path (`SPEC_FULL.md` §9).

use crate::core::mem::{Mem, Reg16};

/// Push `val` onto the stack: SP decremented by exactly 2 once, then the
/// word is written. The legacy double-decrement bug is deliberately not
/// reproduced here (`SPEC_FULL.md` §9).
pub fn push16(mem: &mut Mem, val: u16) {
    let sp = mem.reg16(Reg16::Sp).wrapping_sub(2);
    mem.set_reg16(Reg16::Sp, sp);
    let addr = Mem::linear(mem.reg16(Reg16::Ss), sp);
    mem.write16(addr, val);
}

pub fn pop16(mem: &mut Mem) -> u16 {
    let sp = mem.reg16(Reg16::Sp);
    let addr = Mem::linear(mem.reg16(Reg16::Ss), sp);
    let val = mem.read16(addr);
    mem.set_reg16(Reg16::Sp, sp.wrapping_add(2));
    val
}

/// 80186 PUSHA: pushes AX,CX,DX,BX,SP(original),BP,SI,DI in that order.
pub fn pusha(mem: &mut Mem) {
    let sp_before = mem.reg16(Reg16::Sp);
    for reg in [
        Reg16::Ax,
        Reg16::Cx,
        Reg16::Dx,
        Reg16::Bx,
        Reg16::Zero, // placeholder, overwritten below with sp_before
        Reg16::Bp,
        Reg16::Si,
        Reg16::Di,
    ] {
        let val = if reg == Reg16::Zero {
            sp_before
        } else {
            mem.reg16(reg)
        };
        push16(mem, val);
    }
}

/// 80186 POPA: pops in reverse order, discarding the stacked SP value.
pub fn popa(mem: &mut Mem) {
    for reg in [
        Reg16::Di,
        Reg16::Si,
        Reg16::Bp,
        Reg16::Zero, // discard stacked SP
        Reg16::Bx,
        Reg16::Dx,
        Reg16::Cx,
        Reg16::Ax,
    ] {
        let val = pop16(mem);
        if reg != Reg16::Zero {
            mem.set_reg16(reg, val);
        }
    }
}

pub fn pushf(mem: &mut Mem) {
    let word = mem.flags_word();
    push16(mem, word);
}

pub fn popf(mem: &mut Mem) {
    let word = pop16(mem);
    mem.set_flags_word(word);
}

pub fn sahf(mem: &mut Mem) {
    let ah = mem.reg8(4) as u16;
    let low = mem.flags_word() & 0xFF00;
    mem.set_flags_word(low | ah);
}

pub fn lahf(mem: &mut Mem) {
    let low = (mem.flags_word() & 0xFF) as u8;
    mem.set_reg8(4, low);
}

/// 80186 ENTER imm16, imm8: allocate a stack frame with `nesting_level`
/// (masked to 0..=31 as on real hardware) saved-BP pointers.
pub fn enter(mem: &mut Mem, frame_size: u16, nesting_level: u8) {
    push16(mem, mem.reg16(Reg16::Bp));
    let frame_bp = mem.reg16(Reg16::Sp);
    let level = (nesting_level & 0x1F) as u16;
    if level > 0 {
        let mut bp = mem.reg16(Reg16::Bp);
        for _ in 1..level {
            bp = bp.wrapping_sub(2);
            let addr = Mem::linear(mem.reg16(Reg16::Ss), bp);
            let val = mem.read16(addr);
            push16(mem, val);
        }
        push16(mem, frame_bp);
    }
    mem.set_reg16(Reg16::Bp, frame_bp);
    let new_sp = frame_bp.wrapping_sub(frame_size);
    mem.set_reg16(Reg16::Sp, new_sp);
}

/// 80186 LEAVE: `SP = BP; BP = POP()`.
pub fn leave(mem: &mut Mem) {
    let bp = mem.reg16(Reg16::Bp);
    mem.set_reg16(Reg16::Sp, bp);
    let restored = pop16(mem);
    mem.set_reg16(Reg16::Bp, restored);
}

/// Push FLAGS, CS, IP in that order and clear TF/IF — the common prologue
/// shared by software/hardware/fault interrupt delivery and far calls.
pub fn push_return_frame(mem: &mut Mem) {
    pushf(mem);
    push16(mem, mem.reg16(Reg16::Cs));
    push16(mem, mem.ip());
}

/// IRET: pop IP, CS, FLAGS in that order.
pub fn pop_return_frame(mem: &mut Mem) {
    let ip = pop16(mem);
    let cs = pop16(mem);
    mem.set_ip(ip);
    mem.set_reg16(Reg16::Cs, cs);
    popf(mem);
}

/// RETF: pop IP, CS only (no flags).
pub fn pop_far_return(mem: &mut Mem) {
    let ip = pop16(mem);
    let cs = pop16(mem);
    mem.set_ip(ip);
    mem.set_reg16(Reg16::Cs, cs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mem::DEFAULT_MEM_SIZE;

    #[test]
    fn push_pop_round_trips_and_leaves_sp_unchanged() {
        let mut mem = Mem::new(DEFAULT_MEM_SIZE);
        mem.set_reg16(Reg16::Ss, 0x1000);
        mem.set_reg16(Reg16::Sp, 0x0100);
        let sp_before = mem.reg16(Reg16::Sp);
        push16(&mut mem, 0xBEEF);
        assert_eq!(mem.reg16(Reg16::Sp), sp_before - 2);
        let val = pop16(&mut mem);
        assert_eq!(val, 0xBEEF);
        assert_eq!(mem.reg16(Reg16::Sp), sp_before);
    }

    #[test]
    fn pushf_popf_roundtrips_modulo_reserved_bits() {
        let mut mem = Mem::new(DEFAULT_MEM_SIZE);
        mem.set_reg16(Reg16::Ss, 0x1000);
        mem.set_reg16(Reg16::Sp, 0x0100);
        mem.set_flags_word(0x0202);
        let before = mem.flags_word();
        pushf(&mut mem);
        mem.set_flags_word(0); // scramble
        popf(&mut mem);
        assert_eq!(mem.flags_word() & 0x0FD5, before & 0x0FD5);
    }

    #[test]
    fn pusha_popa_restores_all_general_registers() {
        let mut mem = Mem::new(DEFAULT_MEM_SIZE);
        mem.set_reg16(Reg16::Ss, 0x1000);
        mem.set_reg16(Reg16::Sp, 0x0200);
        mem.set_reg16(Reg16::Ax, 1);
        mem.set_reg16(Reg16::Cx, 2);
        mem.set_reg16(Reg16::Dx, 3);
        mem.set_reg16(Reg16::Bx, 4);
        mem.set_reg16(Reg16::Bp, 5);
        mem.set_reg16(Reg16::Si, 6);
        mem.set_reg16(Reg16::Di, 7);
        pusha(&mut mem);
        mem.set_reg16(Reg16::Ax, 0);
        mem.set_reg16(Reg16::Cx, 0);
        popa(&mut mem);
        assert_eq!(mem.reg16(Reg16::Ax), 1);
        assert_eq!(mem.reg16(Reg16::Di), 7);
        assert_eq!(mem.reg16(Reg16::Sp), 0x0200);
    }

    #[test]
    fn sahf_lahf_round_trip_low_flag_byte() {
        let mut mem = Mem::new(DEFAULT_MEM_SIZE);
        mem.set_reg8(4, 0x81); // AH = CF|SF set pattern
        sahf(&mut mem);
        mem.set_reg8(4, 0);
        lahf(&mut mem);
        assert_eq!(mem.reg8(4), 0x81);
    }
}
