//! OAM DMA and DMC DMA bus arbitration.
//!
//! Rather than a combined state machine, each DMA is its own small
//! machine and the driver asks one question per CPU cycle: does the DMC
//! currently hold the bus? DMC holds it only on its halt and read cycles;
//! during its two middle dummy cycles an in-flight OAM DMA keeps
//! executing; that is the hardware's time-sharing. A DMC steal that lands on an
//! OAM read phase makes OAM re-perform that read when it resumes, so the
//! same address is read twice.

use rambo_cpu::Bus;

use crate::bus::SystemBus;

/// OAM DMA phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OamDmaPhase {
    /// No transfer in flight.
    #[default]
    Idle,
    /// Halt/alignment cycles before the first read (1 or 2 of them).
    Aligning,
    /// Read cycle of a byte pair.
    Reading,
    /// Write cycle of a byte pair.
    Writing,
    /// DMC stole the bus out of a read; the read repeats on resume.
    PausedDuringRead,
    /// DMC stole the bus out of a write; the write proceeds on resume.
    PausedDuringWrite,
}

impl OamDmaPhase {
    fn index(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Aligning => 1,
            Self::Reading => 2,
            Self::Writing => 3,
            Self::PausedDuringRead => 4,
            Self::PausedDuringWrite => 5,
        }
    }

    fn from_index(index: u8) -> Option<Self> {
        Some(match index {
            0 => Self::Idle,
            1 => Self::Aligning,
            2 => Self::Reading,
            3 => Self::Writing,
            4 => Self::PausedDuringRead,
            5 => Self::PausedDuringWrite,
            _ => return None,
        })
    }
}

/// OAM DMA engine ($4014).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OamDma {
    phase: OamDmaPhase,
    /// Source page (address high byte).
    page: u8,
    /// Byte offset within the page (0-255; 256 terminates).
    offset: u16,
    /// Byte carried from read to write.
    temp: u8,
    /// Remaining halt/alignment cycles.
    align_remaining: u8,
}

impl OamDma {
    /// Create an idle engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// $4014 write: begin a transfer.
    ///
    /// One halt cycle always; a second alignment cycle when the write
    /// landed on an odd CPU cycle (513 vs 514 total).
    pub fn trigger(&mut self, page: u8, odd_cpu_cycle: bool) {
        self.phase = OamDmaPhase::Aligning;
        self.page = page;
        self.offset = 0;
        self.align_remaining = if odd_cpu_cycle { 2 } else { 1 };
    }

    /// A transfer is in flight.
    #[inline]
    #[must_use]
    pub fn active(&self) -> bool {
        self.phase != OamDmaPhase::Idle
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> OamDmaPhase {
        self.phase
    }

    /// Execute one DMA cycle (the DMC is not holding the bus).
    pub fn step(&mut self, bus: &mut SystemBus) {
        match self.phase {
            OamDmaPhase::Idle => {}
            OamDmaPhase::Aligning => {
                self.align_remaining -= 1;
                if self.align_remaining == 0 {
                    self.phase = OamDmaPhase::Reading;
                }
            }
            OamDmaPhase::Reading | OamDmaPhase::PausedDuringRead => {
                // A resume out of PausedDuringRead re-performs the read
                // the DMC interrupted: the same address, again.
                self.temp = bus.read((u16::from(self.page) << 8) | self.offset);
                self.phase = OamDmaPhase::Writing;
            }
            OamDmaPhase::Writing | OamDmaPhase::PausedDuringWrite => {
                bus.ppu.dma_write_oam(self.temp);
                self.offset += 1;
                self.phase = if self.offset == 256 {
                    OamDmaPhase::Idle
                } else {
                    OamDmaPhase::Reading
                };
            }
        }
    }

    /// The DMC holds the bus this cycle: freeze, recording whether a read
    /// or a write was interrupted. An interrupted read still hits the bus
    /// before the steal (and repeats after it).
    pub fn pause(&mut self, bus: &mut SystemBus) {
        match self.phase {
            OamDmaPhase::Reading => {
                self.temp = bus.read((u16::from(self.page) << 8) | self.offset);
                self.phase = OamDmaPhase::PausedDuringRead;
            }
            OamDmaPhase::Writing => {
                self.phase = OamDmaPhase::PausedDuringWrite;
            }
            _ => {}
        }
    }

    /// Append raw state (snapshots).
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.push(self.phase.index());
        out.push(self.page);
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.push(self.temp);
        out.push(self.align_remaining);
    }

    /// Restore raw state.
    pub fn load_state(&mut self, data: &[u8], pos: &mut usize) -> Option<()> {
        self.phase = OamDmaPhase::from_index(*data.get(*pos)?)?;
        self.page = *data.get(*pos + 1)?;
        self.offset = u16::from_le_bytes([*data.get(*pos + 2)?, *data.get(*pos + 3)?]);
        self.temp = *data.get(*pos + 4)?;
        self.align_remaining = *data.get(*pos + 5)?;
        *pos += 6;
        Some(())
    }
}

/// DMC DMA phase: 1 halt + 2 dummy + 1 read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DmcDmaPhase {
    #[default]
    Idle,
    Halt,
    Dummy1,
    Dummy2,
    Read,
}

/// DMC sample-fetch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmcDma {
    phase: DmcDmaPhase,
    address: u16,
}

impl DmcDma {
    /// Create an idle engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a 4-cycle fetch of `address`.
    pub fn trigger(&mut self, address: u16) {
        self.phase = DmcDmaPhase::Halt;
        self.address = address;
    }

    /// A fetch is in flight.
    #[inline]
    #[must_use]
    pub fn active(&self) -> bool {
        self.phase != DmcDmaPhase::Idle
    }

    /// The bus is stolen this cycle (halt and read cycles only; OAM DMA
    /// keeps running through the two dummy cycles).
    #[inline]
    #[must_use]
    pub fn holds_bus(&self) -> bool {
        matches!(self.phase, DmcDmaPhase::Halt | DmcDmaPhase::Read)
    }

    /// Execute one fetch cycle. On the read cycle the fetched byte is
    /// handed to the APU's DMC channel.
    pub fn step(&mut self, bus: &mut SystemBus) {
        self.phase = match self.phase {
            DmcDmaPhase::Idle => DmcDmaPhase::Idle,
            DmcDmaPhase::Halt => DmcDmaPhase::Dummy1,
            DmcDmaPhase::Dummy1 => DmcDmaPhase::Dummy2,
            DmcDmaPhase::Dummy2 => DmcDmaPhase::Read,
            DmcDmaPhase::Read => {
                let value = bus.read(self.address);
                bus.apu.dmc_load_sample(value);
                DmcDmaPhase::Idle
            }
        };
    }

    /// Append raw state (snapshots).
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.push(match self.phase {
            DmcDmaPhase::Idle => 0,
            DmcDmaPhase::Halt => 1,
            DmcDmaPhase::Dummy1 => 2,
            DmcDmaPhase::Dummy2 => 3,
            DmcDmaPhase::Read => 4,
        });
        out.extend_from_slice(&self.address.to_le_bytes());
    }

    /// Restore raw state.
    pub fn load_state(&mut self, data: &[u8], pos: &mut usize) -> Option<()> {
        self.phase = match *data.get(*pos)? {
            0 => DmcDmaPhase::Idle,
            1 => DmcDmaPhase::Halt,
            2 => DmcDmaPhase::Dummy1,
            3 => DmcDmaPhase::Dummy2,
            4 => DmcDmaPhase::Read,
            _ => return None,
        };
        self.address = u16::from_le_bytes([*data.get(*pos + 1)?, *data.get(*pos + 2)?]);
        *pos += 3;
        Some(())
    }
}
