/// Faults the virtual machine can report.
///
/// `RomTooLarge` comes back from `load_program` before anything is written.
/// The other two are decode-time faults; they reach the host through the
/// returned engine state rather than a `Result`, since the cycle loop
/// inspects that state every iteration anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    #[error("ROM is too large ({size} bytes), capacity is {capacity} bytes")]
    RomTooLarge { size: usize, capacity: usize },

    #[error("unknown opcode {opcode:#06X}")]
    UnknownOpcode { opcode: u16 },

    #[error("jump to self at {addr:#05X}")]
    InfiniteLoop { addr: u16 },
}
