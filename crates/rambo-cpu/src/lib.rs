//! Microstep-accurate MOS 6502 core for the RAMBO NES emulator.
//!
//! The CPU is a state machine over individual bus cycles: [`Cpu::tick`]
//! performs exactly one bus transaction (or one internal cycle) and
//! returns. Every dummy read and double write the hardware performs is
//! reproduced, because the rest of the console can observe them (PPU
//! register side effects, open-bus updates, DMA alignment).
//!
//! This is the NES variant of the 6502: the decimal flag is storable but
//! never consulted by ADC/SBC.

mod addressing;
mod bus;
mod cpu;
mod instructions;
mod opcodes;
mod state;
mod status;

pub use addressing::AddressingMode;
pub use bus::Bus;
pub use cpu::{Cpu, NMI_VECTOR, IRQ_VECTOR, RESET_VECTOR};
pub use opcodes::{Mnemonic, Opcode, OPCODE_TABLE};
pub use state::{ExecState, InstructionKind};
pub use status::Status;
