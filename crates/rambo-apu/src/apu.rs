//! The APU register file and per-cycle tick.

use crate::dmc::Dmc;
use crate::frame_counter::FrameCounter;
use crate::noise::Noise;
use crate::pulse::{Pulse, SweepComplement};
use crate::triangle::Triangle;

/// Raw per-cycle channel levels. Mixing is the host's problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelOutputs {
    /// Pulse 1 level (0-15).
    pub pulse1: u8,
    /// Pulse 2 level (0-15).
    pub pulse2: u8,
    /// Triangle level (0-15).
    pub triangle: u8,
    /// Noise level (0-15).
    pub noise: u8,
    /// DMC level (0-127).
    pub dmc: u8,
}

/// Ricoh 2A03 APU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,
    frame_counter: FrameCounter,
    /// Pulse and noise timers run at half CPU rate.
    odd_cycle: bool,
}

impl Apu {
    /// Create an APU in power-on state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pulse1: Pulse::new(SweepComplement::Ones),
            pulse2: Pulse::new(SweepComplement::Twos),
            triangle: Triangle::new(),
            noise: Noise::new(),
            dmc: Dmc::new(),
            frame_counter: FrameCounter::new(),
            odd_cycle: false,
        }
    }

    /// Reset to power-like state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Clock one CPU cycle.
    pub fn tick(&mut self) {
        let signals = self.frame_counter.clock();

        if signals.quarter_frame {
            self.pulse1.clock_quarter_frame();
            self.pulse2.clock_quarter_frame();
            self.triangle.clock_quarter_frame();
            self.noise.clock_quarter_frame();
        }
        if signals.half_frame {
            self.pulse1.clock_half_frame();
            self.pulse2.clock_half_frame();
            self.triangle.clock_half_frame();
            self.noise.clock_half_frame();
        }

        self.triangle.clock_timer();
        self.dmc.clock_timer();
        if self.odd_cycle {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
            self.noise.clock_timer();
        }
        self.odd_cycle = !self.odd_cycle;
    }

    /// Register write, $4000-$4013, $4015, $4017.
    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000 => self.pulse1.write_control(value),
            0x4001 => self.pulse1.write_sweep(value),
            0x4002 => self.pulse1.write_period_lo(value),
            0x4003 => self.pulse1.write_period_hi(value),
            0x4004 => self.pulse2.write_control(value),
            0x4005 => self.pulse2.write_sweep(value),
            0x4006 => self.pulse2.write_period_lo(value),
            0x4007 => self.pulse2.write_period_hi(value),
            0x4008 => self.triangle.write_control(value),
            0x400A => self.triangle.write_period_lo(value),
            0x400B => self.triangle.write_period_hi(value),
            0x400C => self.noise.write_control(value),
            0x400E => self.noise.write_mode(value),
            0x400F => self.noise.write_length(value),
            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.write_direct_load(value),
            0x4012 => self.dmc.write_sample_address(value),
            0x4013 => self.dmc.write_sample_length(value),
            0x4015 => self.write_status(value),
            0x4017 => self.frame_counter.write(value),
            _ => {}
        }
    }

    /// $4015 write: channel enables; always clears the DMC IRQ.
    fn write_status(&mut self, value: u8) {
        self.pulse1.set_enabled(value & 0x01 != 0);
        self.pulse2.set_enabled(value & 0x02 != 0);
        self.triangle.set_enabled(value & 0x04 != 0);
        self.noise.set_enabled(value & 0x08 != 0);
        self.dmc.set_enabled(value & 0x10 != 0);
        self.dmc.clear_irq();
    }

    /// $4015 read: status bits; clears the frame IRQ (only).
    pub fn read_status(&mut self) -> u8 {
        let value = self.peek_status();
        self.frame_counter.clear_irq();
        value
    }

    /// $4015 without side effects (debugger surface).
    #[must_use]
    pub fn peek_status(&self) -> u8 {
        let mut value = 0;
        if self.pulse1.length_active() {
            value |= 0x01;
        }
        if self.pulse2.length_active() {
            value |= 0x02;
        }
        if self.triangle.length_active() {
            value |= 0x04;
        }
        if self.noise.length_active() {
            value |= 0x08;
        }
        if self.dmc.bytes_remaining() > 0 {
            value |= 0x10;
        }
        if self.frame_counter.irq_flag() {
            value |= 0x40;
        }
        if self.dmc.irq_flag() {
            value |= 0x80;
        }
        value
    }

    /// Level-triggered IRQ line (frame IRQ or DMC IRQ).
    #[must_use]
    pub fn irq_line(&self) -> bool {
        self.frame_counter.irq_flag() || self.dmc.irq_flag()
    }

    /// DMC wants a sample byte fetched from this address.
    #[must_use]
    pub fn dmc_pending_fetch(&self) -> Option<u16> {
        self.dmc.pending_fetch()
    }

    /// Deliver a DMA-fetched DMC sample byte.
    pub fn dmc_load_sample(&mut self, value: u8) {
        self.dmc.load_sample(value);
    }

    /// Current raw channel levels.
    #[must_use]
    pub fn channel_outputs(&self) -> ChannelOutputs {
        ChannelOutputs {
            pulse1: self.pulse1.output(),
            pulse2: self.pulse2.output(),
            triangle: self.triangle.output(),
            noise: self.noise.output(),
            dmc: self.dmc.output(),
        }
    }

    /// Append the complete APU state to `out`.
    pub fn save_state(&self, out: &mut Vec<u8>) {
        self.pulse1.save_state(out);
        self.pulse2.save_state(out);
        self.triangle.save_state(out);
        self.noise.save_state(out);
        self.dmc.save_state(out);
        self.frame_counter.save_state(out);
        out.push(u8::from(self.odd_cycle));
    }

    /// Restore state previously written by [`Apu::save_state`].
    pub fn load_state(&mut self, data: &[u8], pos: &mut usize) -> Option<()> {
        self.pulse1.load_state(data, pos)?;
        self.pulse2.load_state(data, pos)?;
        self.triangle.load_state(data, pos)?;
        self.noise.load_state(data, pos)?;
        self.dmc.load_state(data, pos)?;
        self.frame_counter.load_state(data, pos)?;
        let odd = *data.get(*pos)?;
        *pos += 1;
        self.odd_cycle = odd != 0;
        Some(())
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
