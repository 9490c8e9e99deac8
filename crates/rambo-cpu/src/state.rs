//! CPU execution state machine for microstep execution.
//!
//! Each [`ExecState`] value is one CPU cycle with exactly one bus access
//! (internal cycles perform the dummy read the hardware performs). The
//! machine transitions through these states so that every instruction
//! consumes its real cycle count on the real addresses.

/// Per-cycle execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    /// Fetch opcode from PC (cycle 1 of every instruction); interrupt
    /// polling happens on entry.
    #[default]
    FetchOpcode,

    /// Fetch low operand byte.
    FetchOperandLo,

    /// Fetch high operand byte.
    FetchOperandHi,

    /// Dummy read of the unindexed zero-page address while X/Y is added.
    IndexZeroPage,

    /// Dummy read at the partially-indexed address (low byte added, page
    /// carry not yet applied).
    IndexFixup,

    /// Read pointer low byte (indirect modes).
    FetchPointerLo,

    /// Read pointer high byte (indirect modes, with zero-page/page wrap).
    FetchPointerHi,

    /// Read data from the effective address and execute.
    ReadData,

    /// Write data to the effective address.
    WriteData,

    /// Read-modify-write: read phase.
    RmwRead,

    /// Read-modify-write: hardware writes the original value back.
    RmwDummyWrite,

    /// Read-modify-write: write the modified value.
    RmwWrite,

    /// Implied/accumulator execute cycle (dummy read of PC).
    ImpliedExecute,

    /// Branch taken: dummy read at PC, add offset to PCL.
    BranchTaken,

    /// Branch crossed a page: dummy read at the unfixed PC, fix PCH.
    BranchFixup,

    /// Dummy read of PC (cycle 2 of stack and return instructions).
    DummyFetch,

    /// Dummy read of the stack top (pre-increment cycle of pulls/returns).
    StackDummy,

    /// Push A or P (PHA/PHP write cycle).
    PushData,

    /// Pull A or P (final PLA/PLP cycle).
    PullData,

    /// JSR: internal stack cycle before the pushes.
    JsrInternal,

    /// JSR: push PCH.
    JsrPushPcHi,

    /// JSR: push PCL.
    JsrPushPcLo,

    /// JSR: fetch target high byte and jump.
    JsrFetchHi,

    /// RTS: pull PCL.
    RtsPopPcLo,

    /// RTS: pull PCH.
    RtsPopPcHi,

    /// RTS: dummy read at the restored PC, then increment it.
    RtsIncrement,

    /// RTI: pull P.
    RtiPopStatus,

    /// RTI: pull PCL.
    RtiPopPcLo,

    /// RTI: pull PCH.
    RtiPopPcHi,

    /// BRK: read (and discard) the padding byte, incrementing PC.
    BrkPadding,

    /// Hardware interrupt: second dummy read of PC.
    InterruptDummy,

    /// Interrupt sequence: push PCH.
    InterruptPushPcHi,

    /// Interrupt sequence: push PCL.
    InterruptPushPcLo,

    /// Interrupt sequence: push P (B set only for BRK).
    InterruptPushStatus,

    /// Interrupt sequence: fetch vector low byte (NMI hijack point).
    InterruptFetchVectorLo,

    /// Interrupt sequence: fetch vector high byte.
    InterruptFetchVectorHi,
}

impl ExecState {
    /// Every state in a fixed order, defining the snapshot encoding.
    const ALL: [Self; 36] = [
        Self::FetchOpcode,
        Self::FetchOperandLo,
        Self::FetchOperandHi,
        Self::IndexZeroPage,
        Self::IndexFixup,
        Self::FetchPointerLo,
        Self::FetchPointerHi,
        Self::ReadData,
        Self::WriteData,
        Self::RmwRead,
        Self::RmwDummyWrite,
        Self::RmwWrite,
        Self::ImpliedExecute,
        Self::BranchTaken,
        Self::BranchFixup,
        Self::DummyFetch,
        Self::StackDummy,
        Self::PushData,
        Self::PullData,
        Self::JsrInternal,
        Self::JsrPushPcHi,
        Self::JsrPushPcLo,
        Self::JsrFetchHi,
        Self::RtsPopPcLo,
        Self::RtsPopPcHi,
        Self::RtsIncrement,
        Self::RtiPopStatus,
        Self::RtiPopPcLo,
        Self::RtiPopPcHi,
        Self::BrkPadding,
        Self::InterruptDummy,
        Self::InterruptPushPcHi,
        Self::InterruptPushPcLo,
        Self::InterruptPushStatus,
        Self::InterruptFetchVectorLo,
        Self::InterruptFetchVectorHi,
    ];

    /// Stable snapshot index of this state.
    #[must_use]
    pub fn index(self) -> u8 {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .unwrap_or_default() as u8
    }

    /// Rebuild a state from its snapshot index.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }
}

/// Instruction execution pattern.
///
/// The pair (kind, addressing mode) fully determines the cycle sequence an
/// opcode walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstructionKind {
    /// Load/ALU instructions that read the operand.
    #[default]
    Read,

    /// Store instructions.
    Write,

    /// Read-modify-write instructions (dummy-write the original value).
    ReadModifyWrite,

    /// Single-byte register/flag operations.
    Implied,

    /// Shift/rotate on the accumulator.
    Accumulator,

    /// Conditional branches.
    Branch,

    /// JMP absolute.
    JumpAbsolute,

    /// JMP indirect.
    JumpIndirect,

    /// JSR.
    JumpSubroutine,

    /// RTS.
    ReturnSubroutine,

    /// RTI.
    ReturnInterrupt,

    /// PHA/PHP.
    Push,

    /// PLA/PLP.
    Pull,

    /// BRK.
    Break,

    /// KIL/JAM halt opcodes.
    Jam,
}

impl InstructionKind {
    /// Page-crossing penalty applies (reads pay it only when crossing;
    /// writes and RMW always pay the fixup cycle).
    #[inline]
    #[must_use]
    pub const fn has_page_cross_penalty(self) -> bool {
        matches!(self, Self::Read | Self::Branch)
    }

    /// Total cycles for this kind with the given addressing mode, not
    /// counting penalties. Used by tests to pin the state machine.
    #[must_use]
    pub const fn base_cycles(self, mode: crate::AddressingMode) -> u8 {
        use crate::AddressingMode as M;
        match self {
            Self::Implied | Self::Accumulator | Self::Jam => 2,
            Self::Branch => 2,
            Self::JumpAbsolute => 3,
            Self::JumpIndirect => 5,
            Self::JumpSubroutine | Self::ReturnSubroutine | Self::ReturnInterrupt => 6,
            Self::Push => 3,
            Self::Pull => 4,
            Self::Break => 7,
            Self::Read => match mode {
                M::Immediate => 2,
                M::ZeroPage => 3,
                M::ZeroPageX | M::ZeroPageY | M::Absolute | M::AbsoluteX | M::AbsoluteY => 4,
                M::IndirectIndexedY => 5,
                M::IndexedIndirectX => 6,
                _ => 2,
            },
            Self::Write => match mode {
                M::ZeroPage => 3,
                M::ZeroPageX | M::ZeroPageY | M::Absolute => 4,
                M::AbsoluteX | M::AbsoluteY => 5,
                M::IndirectIndexedY | M::IndexedIndirectX => 6,
                _ => 3,
            },
            Self::ReadModifyWrite => match mode {
                M::ZeroPage => 5,
                M::ZeroPageX | M::Absolute => 6,
                M::AbsoluteX | M::AbsoluteY => 7,
                M::IndirectIndexedY | M::IndexedIndirectX => 8,
                _ => 5,
            },
        }
    }
}
