use crate::core::host::HostInterface;
use crate::core::mem::Mem;
use crate::cpu::decode::DecodeTables;

/// Anything that advances the machine by one whole instruction.
///
/// The 8086 core does not model cycle-exact timing (`SPEC_FULL.md` §1
/// Non-goals), so unlike a cycle-stepped component `tick` always completes a
/// whole instruction and always reports an instruction boundary. This plays
/// the role the teacher's generic `BusMasterComponent::tick_with_bus` plays
/// for its cycle-stepped CPUs, specialized to the one bus/host pairing this
/// engine has.
pub trait Component {
    /// Execute one whole instruction against `mem`, consulting `tables` for
    /// decode information and `host` for device/interrupt/hypercall access.
    /// Returns `true` at an instruction boundary (always, for this engine).
    fn tick(&mut self, mem: &mut Mem, tables: &DecodeTables, host: &mut dyn HostInterface) -> bool;
}
