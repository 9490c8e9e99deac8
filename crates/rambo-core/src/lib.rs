//! RAMBO emulation core.
//!
//! One master-cycle counter drives everything: the PPU steps every tick,
//! the CPU and APU step on every third tick, and VBlank/NMI arbitration
//! goes through a timestamp ledger instead of a boolean flag. The sole
//! entry point is [`EmulationState::tick`]; the host calls it in a loop,
//! reads the framebuffer after a completed frame, and publishes controller
//! masks.
//!
//! The core does no I/O, spawns no threads, and allocates nothing on the
//! tick path.

mod bus;
mod clock;
mod dma;
mod emulation;
mod input;
mod ledger;
mod open_bus;
mod snapshot;

pub use bus::SystemBus;
pub use clock::MasterClock;
pub use dma::{DmcDma, OamDma, OamDmaPhase};
pub use emulation::{Config, EmulationState, TickResult};
pub use input::{Button, Controller};
pub use ledger::VblankLedger;
pub use open_bus::OpenBus;
pub use snapshot::SnapshotError;

pub use rambo_apu::ChannelOutputs;
pub use rambo_cpu::{Bus, Cpu, Status};
pub use rambo_mappers::{Cartridge, Mirroring, Nrom, Rom, RomError, RomHeader};
pub use rambo_ppu::{FRAME_HEIGHT, FRAME_PIXELS, FRAME_WIDTH};
