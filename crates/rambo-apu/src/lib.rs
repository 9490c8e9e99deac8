//! Ricoh 2A03 APU emulation for the RAMBO NES core.
//!
//! The APU is clocked once per CPU cycle. It exposes the raw per-cycle
//! channel levels ([`ChannelOutputs`]); mixing and resampling are host
//! concerns and never enter the core. DMC sample fetches are *requested*
//! here but *executed* by the driver's DMA unit, which owns the bus
//! arbitration.

mod apu;
mod dmc;
mod envelope;
mod frame_counter;
mod length_counter;
mod linear_counter;
mod noise;
mod pulse;
mod sweep;
mod triangle;

pub use apu::{Apu, ChannelOutputs};
pub use dmc::Dmc;
pub use envelope::Envelope;
pub use frame_counter::{FrameCounter, FrameCounterMode, FrameSignals};
pub use length_counter::LengthCounter;
pub use linear_counter::LinearCounter;
pub use noise::Noise;
pub use pulse::{Pulse, SweepComplement};
pub use sweep::Sweep;
pub use triangle::Triangle;
