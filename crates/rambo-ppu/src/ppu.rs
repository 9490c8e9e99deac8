//! The PPU proper: register interface, warmup gate, and the per-dot step.
//!
//! The driver owns the event ledger for VBlank/NMI arbitration, so
//! [`Ppu::step`] never touches a VBlank flag. It reports the interesting
//! dots in [`DotEffects`] and the driver applies them after the CPU
//! sub-step of the same master cycle.

use rambo_mappers::{Cartridge, Mirroring};

use crate::background::Background;
use crate::oam::{Oam, SecondaryOam};
use crate::palette::color_with_emphasis;
use crate::registers::{PpuCtrl, PpuMask, PpuStatus};
use crate::scroll::Scroll;
use crate::sprites::{SpriteEvaluator, SpriteRenderer, SpriteUnit};
use crate::timing::Timing;
use crate::vram::Vram;

/// Framebuffer width in pixels.
pub const FRAME_WIDTH: usize = 256;
/// Framebuffer height in pixels.
pub const FRAME_HEIGHT: usize = 240;
/// Framebuffer length in pixels.
pub const FRAME_PIXELS: usize = FRAME_WIDTH * FRAME_HEIGHT;

/// PPUCTRL writes before warmup completes are dropped; this is the window
/// in dots (29 658 CPU cycles).
const WARMUP_DOTS: u32 = 29_658 * 3;

/// Open-bus decay horizon, roughly 600 ms of dots.
const OPEN_BUS_DECAY_DOTS: u32 = 3_220_000;

/// Deferred effects of one PPU dot, applied by the driver post-cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DotEffects {
    /// This dot is scanline 241 dot 1: VBlank sets (unless prevented).
    pub vblank_set_point: bool,
    /// This dot is scanline 261 dot 1: VBlank span ends, sprite flags clear.
    pub vblank_clear_point: bool,
    /// A sprite-0 hit was detected on this dot.
    pub sprite_zero_hit: bool,
    /// The visible frame is complete (reached scanline 241 dot 1).
    pub frame_complete: bool,
}

/// Result of a PPUCTRL write, for the driver's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlWriteEffect {
    /// NMI enable before the write.
    pub old_nmi_enable: bool,
    /// NMI enable after the write.
    pub new_nmi_enable: bool,
}

/// Ricoh 2C02.
#[derive(Debug, Clone)]
pub struct Ppu {
    ctrl: PpuCtrl,
    mask: PpuMask,
    /// PPUMASK writes land here and apply at the next dot (the hardware's
    /// one-cycle rendering-enable delay).
    pending_mask: Option<PpuMask>,
    /// Sprite flags only; the VBlank bit is composed from the ledger.
    status: PpuStatus,
    scroll: Scroll,
    vram: Vram,
    oam: Oam,
    secondary_oam: SecondaryOam,
    background: Background,
    sprite_evaluator: SpriteEvaluator,
    sprite_renderer: SpriteRenderer,
    timing: Timing,

    /// $2007 read buffer.
    read_buffer: u8,
    /// PPU register open-bus latch with decay.
    latch: u8,
    decay_dots: u32,
    /// Dots remaining until register writes are honored.
    warmup_dots: u32,
    /// Warmup window to re-impose on reset (0 when disabled by config).
    warmup_window: u32,
}

impl Ppu {
    /// Create a PPU in power-on state.
    ///
    /// With `enforce_warmup`, writes to $2000/$2001/$2005/$2006 are
    /// discarded for the first 29 658 CPU cycles, as on hardware.
    #[must_use]
    pub fn new(enforce_warmup: bool) -> Self {
        let warmup = if enforce_warmup { WARMUP_DOTS } else { 0 };
        Self {
            ctrl: PpuCtrl::empty(),
            mask: PpuMask::empty(),
            pending_mask: None,
            status: PpuStatus::empty(),
            scroll: Scroll::new(),
            vram: Vram::new(Mirroring::Horizontal),
            oam: Oam::new(),
            secondary_oam: SecondaryOam::new(),
            background: Background::new(),
            sprite_evaluator: SpriteEvaluator::new(),
            sprite_renderer: SpriteRenderer::new(),
            timing: Timing::new(),
            read_buffer: 0,
            latch: 0,
            decay_dots: 0,
            warmup_dots: warmup,
            warmup_window: warmup,
        }
    }

    /// Adopt the cartridge's mirroring (called at load).
    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.vram.set_mirroring(mirroring);
    }

    /// Reset: registers cleared, warmup window re-imposed, memories kept.
    pub fn reset(&mut self) {
        self.ctrl = PpuCtrl::empty();
        self.mask = PpuMask::empty();
        self.pending_mask = None;
        self.status = PpuStatus::empty();
        self.scroll = Scroll::new();
        self.background.reset();
        self.sprite_renderer.clear();
        self.secondary_oam.clear();
        self.timing.reset();
        self.read_buffer = 0;
        self.latch = 0;
        self.decay_dots = 0;
        self.warmup_dots = self.warmup_window;
    }

    // =====================================================================
    // Position and flag accessors
    // =====================================================================

    /// Current scanline (0-261).
    #[inline]
    #[must_use]
    pub fn scanline(&self) -> u16 {
        self.timing.scanline()
    }

    /// Current dot (0-340).
    #[inline]
    #[must_use]
    pub fn dot(&self) -> u16 {
        self.timing.dot()
    }

    /// Frame counter.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.timing.frame()
    }

    /// NMI output enable from PPUCTRL.
    #[inline]
    #[must_use]
    pub fn nmi_enabled(&self) -> bool {
        self.ctrl.nmi_enabled()
    }

    /// Rendering enable from PPUMASK.
    #[inline]
    #[must_use]
    pub fn rendering_enabled(&self) -> bool {
        self.mask.rendering_enabled()
    }

    /// Warmup window has elapsed.
    #[must_use]
    pub fn warmed_up(&self) -> bool {
        self.warmup_dots == 0
    }

    /// Sprite flags (bits 6-5) as they'd appear in PPUSTATUS.
    #[must_use]
    pub fn sprite_status_bits(&self) -> u8 {
        self.status.bits() & 0x60
    }

    /// Record a sprite-0 hit (driver post-cycle apply).
    pub fn set_sprite_zero_hit(&mut self) {
        self.status.insert(PpuStatus::SPRITE_ZERO_HIT);
    }

    /// Clear sprite-0 hit and overflow (261.1 post-cycle apply).
    pub fn clear_sprite_flags(&mut self) {
        self.status
            .remove(PpuStatus::SPRITE_ZERO_HIT | PpuStatus::SPRITE_OVERFLOW);
    }

    // =====================================================================
    // Register interface (orchestrated by the system bus)
    // =====================================================================

    /// $2000 write. Returns the NMI-enable transition for the ledger, or
    /// `None` when the write was discarded by the warmup gate.
    pub fn write_ctrl(&mut self, value: u8) -> Option<CtrlWriteEffect> {
        self.refresh_latch(value);
        if self.warmup_dots > 0 {
            log::debug!("PPUCTRL write ${value:02X} discarded during warmup");
            return None;
        }

        let old_nmi_enable = self.ctrl.nmi_enabled();
        self.ctrl = PpuCtrl::from_bits_truncate(value);
        self.scroll.write_ctrl(value);
        Some(CtrlWriteEffect {
            old_nmi_enable,
            new_nmi_enable: self.ctrl.nmi_enabled(),
        })
    }

    /// $2001 write (one-dot rendering-enable delay).
    pub fn write_mask(&mut self, value: u8) {
        self.refresh_latch(value);
        if self.warmup_dots > 0 {
            log::debug!("PPUMASK write ${value:02X} discarded during warmup");
            return;
        }
        self.pending_mask = Some(PpuMask::from_bits_truncate(value));
    }

    /// $2002 read: sprite bits plus open-bus low bits; resets the write
    /// toggle. The VBlank bit 7 is composed by the bus from the ledger.
    pub fn read_status(&mut self) -> u8 {
        let result = self.sprite_status_bits() | (self.latch & 0x1F);
        self.scroll.reset_toggle();
        self.latch = result;
        result
    }

    /// $2003 write.
    pub fn write_oam_addr(&mut self, value: u8) {
        self.refresh_latch(value);
        self.oam.set_addr(value);
    }

    /// $2004 read. During the secondary-OAM clear (dots 1-64 of rendering
    /// scanlines) the hardware returns $FF.
    pub fn read_oam_data(&mut self) -> u8 {
        let value = if self.rendering_enabled()
            && self.timing.is_rendering_scanline()
            && (1..=64).contains(&self.timing.dot())
        {
            0xFF
        } else {
            self.oam.read()
        };
        self.refresh_latch(value);
        value
    }

    /// $2004 write.
    pub fn write_oam_data(&mut self, value: u8) {
        self.refresh_latch(value);
        self.oam.write(value);
    }

    /// $2005 write.
    pub fn write_scroll(&mut self, value: u8) {
        self.refresh_latch(value);
        if self.warmup_dots > 0 {
            return;
        }
        self.scroll.write_scroll(value);
    }

    /// $2006 write.
    pub fn write_addr(&mut self, value: u8) {
        self.refresh_latch(value);
        if self.warmup_dots > 0 {
            return;
        }
        self.scroll.write_addr(value);
    }

    /// $2007 read: buffered for VRAM, immediate for palette.
    pub fn read_data(&mut self, cart: &Cartridge) -> u8 {
        let addr = self.scroll.vram_addr() & 0x3FFF;

        let result = if addr >= 0x3F00 {
            // Palette reads bypass the buffer; bits 7-6 come from the
            // decaying latch. The buffer still loads from the nametable
            // underneath.
            self.read_buffer = self.vram.read(addr - 0x1000);
            (self.vram.read(addr) & 0x3F) | (self.latch & 0xC0)
        } else {
            let buffered = self.read_buffer;
            self.read_buffer = if addr < 0x2000 {
                cart.ppu_read(addr)
            } else {
                self.vram.read(addr)
            };
            buffered
        };

        self.scroll.increment_vram(self.ctrl.vram_increment());
        self.refresh_latch(result);
        result
    }

    /// $2007 write.
    pub fn write_data(&mut self, cart: &mut Cartridge, value: u8) {
        self.refresh_latch(value);
        let addr = self.scroll.vram_addr() & 0x3FFF;
        if addr < 0x2000 {
            cart.ppu_write(addr, value);
        } else {
            self.vram.write(addr, value);
        }
        self.scroll.increment_vram(self.ctrl.vram_increment());
    }

    /// OAM DMA byte lands at OAMADDR and advances it.
    pub fn dma_write_oam(&mut self, value: u8) {
        self.oam.dma_write(value);
    }

    /// Open-bus latch value (for undefined register reads).
    #[must_use]
    pub fn open_bus(&self) -> u8 {
        self.latch
    }

    #[inline]
    fn refresh_latch(&mut self, value: u8) {
        self.latch = value;
        self.decay_dots = OPEN_BUS_DECAY_DOTS;
    }

    // =====================================================================
    // The per-dot step
    // =====================================================================

    /// Advance exactly one dot.
    ///
    /// Pixels land in `framebuffer` (256x240 packed RGBA, R low byte).
    /// VBlank-relevant dots are reported, not applied; see [`DotEffects`].
    pub fn step(&mut self, cart: &Cartridge, framebuffer: &mut [u32]) -> DotEffects {
        // Latch decay toward zero.
        if self.decay_dots > 0 {
            self.decay_dots -= 1;
            if self.decay_dots == 0 {
                self.latch = 0;
            }
        }
        if self.warmup_dots > 0 {
            self.warmup_dots -= 1;
        }
        if let Some(mask) = self.pending_mask.take() {
            self.mask = mask;
        }

        let rendering = self.mask.rendering_enabled();
        self.timing.tick(rendering);

        let scanline = self.timing.scanline();
        let dot = self.timing.dot();

        let mut effects = DotEffects::default();

        if rendering && self.timing.is_rendering_scanline() {
            effects.sprite_zero_hit = self.render_dot(cart, framebuffer);
        } else if self.timing.is_visible_scanline() && self.timing.is_visible_dot() {
            // Rendering disabled: the screen shows the backdrop color.
            let color = self.vram.read_palette(0);
            self.put_pixel(framebuffer, color);
        }

        if scanline == 241 && dot == 1 {
            effects.vblank_set_point = true;
            effects.frame_complete = true;
        }
        if scanline == 261 && dot == 1 {
            effects.vblank_clear_point = true;
        }

        effects
    }

    /// All fetch/eval/pixel work for a dot on a rendering scanline.
    /// Returns true when this dot produced a sprite-0 hit.
    #[allow(clippy::too_many_lines)] // the dot schedule is one timeline
    fn render_dot(&mut self, cart: &Cartridge, framebuffer: &mut [u32]) -> bool {
        let scanline = self.timing.scanline();
        let dot = self.timing.dot();
        let visible_scanline = self.timing.is_visible_scanline();
        let mut sprite_zero_hit = false;

        // Background fetch pipeline (dots 1-256 and 321-336).
        if self.timing.is_visible_dot() || self.timing.is_prefetch_dot() {
            self.background.shift();

            match dot & 0x07 {
                1 => {
                    let tile = self.vram.read(self.scroll.nametable_addr());
                    self.background.set_nametable_byte(tile);
                }
                3 => {
                    let attr = self.vram.read(self.scroll.attribute_addr());
                    self.background
                        .set_attribute_byte(attr, self.scroll.coarse_x(), self.scroll.coarse_y());
                }
                5 => {
                    let addr = self.background_pattern_addr(0);
                    self.background.set_pattern_lo(cart.ppu_read(addr));
                }
                7 => {
                    let addr = self.background_pattern_addr(8);
                    self.background.set_pattern_hi(cart.ppu_read(addr));
                }
                0 => {
                    self.background.reload();
                    self.scroll.increment_coarse_x();
                }
                _ => {}
            }

            if dot == 256 {
                self.scroll.increment_fine_y();
            }
        }

        // Garbage nametable fetches at the tail of the scanline.
        if dot == 337 || dot == 339 {
            let _ = self.vram.read(self.scroll.nametable_addr());
        }

        // Scroll reload points.
        if dot == 257 {
            self.scroll.copy_horizontal();
        }
        if self.timing.is_vertical_copy_dot() {
            self.scroll.copy_vertical();
        }

        // Sprite evaluation (visible scanlines only, for the next line).
        if visible_scanline {
            if dot == 1 {
                self.secondary_oam.clear();
                self.sprite_evaluator.start();
            }
            if (65..=256).contains(&dot) && (dot - 65) % 3 == 0 {
                self.sprite_evaluator.step(
                    &self.oam,
                    scanline + 1,
                    self.ctrl.sprite_height(),
                    &mut self.secondary_oam,
                );
                if self.sprite_evaluator.overflow() {
                    self.status.insert(PpuStatus::SPRITE_OVERFLOW);
                }
            }
        } else if dot == 1 {
            // Pre-render line: stale secondary OAM never reaches line 0.
            self.secondary_oam.clear();
        }

        // Sprite pattern fetches (dots 257-320, 8 dots per slot).
        if self.timing.is_sprite_fetch_dot() {
            if dot == 257 {
                self.sprite_renderer.clear();
            }
            let fetch_dot = dot - 257;
            if fetch_dot % 8 == 5 {
                let slot = (fetch_dot / 8) as u8;
                self.fetch_sprite_slot(cart, slot, scanline + 1);
            }
        }

        // Pixel output.
        if visible_scanline && self.timing.is_visible_dot() {
            sprite_zero_hit = self.output_pixel(framebuffer);
            self.sprite_renderer.tick();
        }

        sprite_zero_hit
    }

    #[inline]
    fn background_pattern_addr(&self, plane: u16) -> u16 {
        self.ctrl.background_table_addr()
            + u16::from(self.background.nametable_byte()) * 16
            + u16::from(self.scroll.fine_y())
            + plane
    }

    /// Fetch one secondary-OAM slot's pattern row into a renderer unit.
    fn fetch_sprite_slot(&mut self, cart: &Cartridge, slot: u8, target_scanline: u16) {
        let Some(entry) = self.secondary_oam.sprite(slot) else {
            return;
        };
        let [y, tile, attributes, x] = entry;

        let height = self.ctrl.sprite_height();
        let mut row = target_scanline
            .saturating_sub(u16::from(y))
            .min(height - 1);
        if attributes & 0x80 != 0 {
            row = height - 1 - row;
        }

        let addr = if height == 16 {
            let table = u16::from(tile & 0x01) * 0x1000;
            let mut tile_index = u16::from(tile & 0xFE);
            if row >= 8 {
                tile_index += 1;
                row -= 8;
            }
            table + tile_index * 16 + row
        } else {
            self.ctrl.sprite_table_addr() + u16::from(tile) * 16 + row
        };

        let mut pattern_lo = cart.ppu_read(addr);
        let mut pattern_hi = cart.ppu_read(addr + 8);
        if attributes & 0x40 != 0 {
            pattern_lo = pattern_lo.reverse_bits();
            pattern_hi = pattern_hi.reverse_bits();
        }

        let is_sprite_zero = slot == 0 && self.secondary_oam.sprite_zero_present();
        self.sprite_renderer
            .load(slot, pattern_lo, pattern_hi, attributes, x, is_sprite_zero);
    }

    /// Multiplex background and sprite pixels, write RGBA, detect hit.
    fn output_pixel(&mut self, framebuffer: &mut [u32]) -> bool {
        let dot = self.timing.dot();
        let x = dot - 1;
        let left_column = x < 8;

        let (mut bg_color, bg_palette) = if self.mask.contains(PpuMask::SHOW_BACKGROUND) {
            self.background.pixel(self.scroll.fine_x())
        } else {
            (0, 0)
        };
        if left_column && !self.mask.contains(PpuMask::SHOW_BACKGROUND_LEFT) {
            bg_color = 0;
        }

        let sprite = if self.mask.contains(PpuMask::SHOW_SPRITES)
            && !(left_column && !self.mask.contains(PpuMask::SHOW_SPRITES_LEFT))
        {
            self.sprite_renderer.pixel()
        } else {
            None
        };

        let mut sprite_zero_hit = false;
        let (sprite_color, sprite_palette, behind, is_zero) =
            sprite.unwrap_or((0, 0, false, false));

        // Sprite 0 hit: both layers opaque, dot 256 excluded.
        if is_zero && bg_color != 0 && sprite_color != 0 && dot != 256 {
            sprite_zero_hit = true;
        }

        let palette_addr = match (bg_color, sprite_color) {
            (0, 0) => 0,
            (0, _) => 0x10 | (sprite_palette << 2) | sprite_color,
            (_, 0) => (bg_palette << 2) | bg_color,
            _ if behind => (bg_palette << 2) | bg_color,
            _ => 0x10 | (sprite_palette << 2) | sprite_color,
        };

        let mut color_index = self.vram.read_palette(palette_addr);
        if self.mask.contains(PpuMask::GRAYSCALE) {
            color_index &= 0x30;
        }
        self.put_pixel(framebuffer, color_index);
        sprite_zero_hit
    }

    #[inline]
    fn put_pixel(&self, framebuffer: &mut [u32], color_index: u8) {
        let x = usize::from(self.timing.dot() - 1);
        let y = usize::from(self.timing.scanline());
        let offset = y * FRAME_WIDTH + x;
        if let Some(pixel) = framebuffer.get_mut(offset) {
            *pixel = color_with_emphasis(color_index, self.mask.emphasis());
        }
    }

    // =====================================================================
    // Snapshot support
    // =====================================================================

    /// Append the complete PPU state to `out` in a fixed byte order.
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.push(self.ctrl.bits());
        out.push(self.mask.bits());
        match self.pending_mask {
            Some(mask) => {
                out.push(1);
                out.push(mask.bits());
            }
            None => {
                out.push(0);
                out.push(0);
            }
        }
        out.push(self.status.bits());

        let (v, t, x, w) = self.scroll.raw();
        out.extend_from_slice(&v.to_le_bytes());
        out.extend_from_slice(&t.to_le_bytes());
        out.push(x);
        out.push(u8::from(w));

        out.extend_from_slice(&(self.vram.nametables().len() as u16).to_le_bytes());
        out.extend_from_slice(self.vram.nametables());
        out.extend_from_slice(self.vram.palette_ram());

        out.extend_from_slice(self.oam.bytes());
        out.push(self.oam.addr());

        out.extend_from_slice(self.secondary_oam.bytes());
        out.push(self.secondary_oam.count());
        out.push(u8::from(self.secondary_oam.sprite_zero_present()));

        for word in self.background.raw() {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(&self.sprite_evaluator.raw());
        for unit in self.sprite_renderer.units() {
            out.push(unit.pattern_lo);
            out.push(unit.pattern_hi);
            out.push(unit.attributes);
            out.push(unit.x);
            out.push(u8::from(unit.active));
            out.push(u8::from(unit.is_sprite_zero));
        }

        let (scanline, dot, frame) = self.timing.raw();
        out.extend_from_slice(&scanline.to_le_bytes());
        out.extend_from_slice(&dot.to_le_bytes());
        out.extend_from_slice(&frame.to_le_bytes());

        out.push(self.read_buffer);
        out.push(self.latch);
        out.extend_from_slice(&self.decay_dots.to_le_bytes());
        out.extend_from_slice(&self.warmup_dots.to_le_bytes());
        out.extend_from_slice(&self.warmup_window.to_le_bytes());
    }

    /// Restore state previously written by [`Ppu::save_state`].
    #[allow(clippy::too_many_lines)] // mirror image of save_state
    pub fn load_state(&mut self, data: &[u8], pos: &mut usize) -> Option<()> {
        fn take(data: &[u8], pos: &mut usize) -> Option<u8> {
            let b = *data.get(*pos)?;
            *pos += 1;
            Some(b)
        }
        fn take_u16(data: &[u8], pos: &mut usize) -> Option<u16> {
            Some(u16::from_le_bytes([take(data, pos)?, take(data, pos)?]))
        }
        fn take_u32(data: &[u8], pos: &mut usize) -> Option<u32> {
            Some(u32::from_le_bytes([
                take(data, pos)?,
                take(data, pos)?,
                take(data, pos)?,
                take(data, pos)?,
            ]))
        }
        fn take_u64(data: &[u8], pos: &mut usize) -> Option<u64> {
            let mut bytes = [0u8; 8];
            for byte in &mut bytes {
                *byte = take(data, pos)?;
            }
            Some(u64::from_le_bytes(bytes))
        }

        self.ctrl = PpuCtrl::from_bits_truncate(take(data, pos)?);
        self.mask = PpuMask::from_bits_truncate(take(data, pos)?);
        let has_pending = take(data, pos)? != 0;
        let pending_bits = take(data, pos)?;
        self.pending_mask = has_pending.then(|| PpuMask::from_bits_truncate(pending_bits));
        self.status = PpuStatus::from_bits_truncate(take(data, pos)?);

        let v = take_u16(data, pos)?;
        let t = take_u16(data, pos)?;
        let x = take(data, pos)?;
        let w = take(data, pos)? != 0;
        self.scroll.set_raw(v, t, x, w);

        let nt_len = usize::from(take_u16(data, pos)?);
        if data.len() < *pos + nt_len || nt_len != self.vram.nametables().len() {
            return None;
        }
        self.vram.set_nametables(&data[*pos..*pos + nt_len]);
        *pos += nt_len;
        let mut palette = [0u8; 32];
        for byte in &mut palette {
            *byte = take(data, pos)?;
        }
        self.vram.set_palette_ram(&palette);

        let mut oam_bytes = [0u8; 256];
        for byte in &mut oam_bytes {
            *byte = take(data, pos)?;
        }
        self.oam.set_bytes(&oam_bytes);
        self.oam.set_addr(take(data, pos)?);

        let mut sec = [0u8; 32];
        for byte in &mut sec {
            *byte = take(data, pos)?;
        }
        let count = take(data, pos)?;
        let zero_present = take(data, pos)? != 0;
        self.secondary_oam.set_raw(&sec, count, zero_present);

        let mut bg = [0u16; 6];
        for word in &mut bg {
            *word = take_u16(data, pos)?;
        }
        self.background.set_raw(bg);

        let eval = [
            take(data, pos)?,
            take(data, pos)?,
            take(data, pos)?,
            take(data, pos)?,
        ];
        self.sprite_evaluator.set_raw(eval);

        let mut units = [SpriteUnit::default(); 8];
        for unit in &mut units {
            unit.pattern_lo = take(data, pos)?;
            unit.pattern_hi = take(data, pos)?;
            unit.attributes = take(data, pos)?;
            unit.x = take(data, pos)?;
            unit.active = take(data, pos)? != 0;
            unit.is_sprite_zero = take(data, pos)? != 0;
        }
        self.sprite_renderer.set_units(units);

        let scanline = take_u16(data, pos)?;
        let dot = take_u16(data, pos)?;
        let frame = take_u64(data, pos)?;
        self.timing.set_raw(scanline, dot, frame);

        self.read_buffer = take(data, pos)?;
        self.latch = take(data, pos)?;
        self.decay_dots = take_u32(data, pos)?;
        self.warmup_dots = take_u32(data, pos)?;
        self.warmup_window = take_u32(data, pos)?;
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cart() -> Cartridge {
        let mut data = vec![0x4E, 0x45, 0x53, 0x1A, 1, 0, 0, 0]; // CHR RAM
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&vec![0; 16384]);
        Cartridge::from_bytes(&data).unwrap()
    }

    fn warmed_ppu() -> Ppu {
        Ppu::new(false)
    }

    fn step_to(ppu: &mut Ppu, cart: &Cartridge, scanline: u16, dot: u16) {
        let mut fb = vec![0u32; FRAME_PIXELS];
        let mut guard = 0u32;
        while !(ppu.scanline() == scanline && ppu.dot() == dot) {
            ppu.step(cart, &mut fb);
            guard += 1;
            assert!(guard < 200_000, "never reached {scanline}:{dot}");
        }
    }

    #[test]
    fn test_warmup_discards_ctrl_writes() {
        let mut ppu = Ppu::new(true);
        assert!(ppu.write_ctrl(0x80).is_none());
        assert!(!ppu.nmi_enabled());

        // Burn through the warmup window.
        let cart = test_cart();
        let mut fb = vec![0u32; FRAME_PIXELS];
        for _ in 0..WARMUP_DOTS {
            ppu.step(&cart, &mut fb);
        }
        assert!(ppu.warmed_up());
        assert!(ppu.write_ctrl(0x80).is_some());
        assert!(ppu.nmi_enabled());
    }

    #[test]
    fn test_ctrl_write_reports_nmi_transition() {
        let mut ppu = warmed_ppu();
        let effect = ppu.write_ctrl(0x80).unwrap();
        assert!(!effect.old_nmi_enable);
        assert!(effect.new_nmi_enable);

        let effect = ppu.write_ctrl(0x00).unwrap();
        assert!(effect.old_nmi_enable);
        assert!(!effect.new_nmi_enable);
    }

    #[test]
    fn test_status_read_resets_toggle() {
        let mut ppu = warmed_ppu();
        ppu.write_addr(0x21); // first write
        let _ = ppu.read_status();
        ppu.write_addr(0x3F); // first write again after toggle reset
        ppu.write_addr(0x00);
        assert_eq!(ppu.scroll.vram_addr(), 0x3F00);
    }

    #[test]
    fn test_vram_write_read_buffered() {
        let mut ppu = warmed_ppu();
        let mut cart = test_cart();

        ppu.write_addr(0x20);
        ppu.write_addr(0x00);
        ppu.write_data(&mut cart, 0x55);

        ppu.write_addr(0x20);
        ppu.write_addr(0x00);
        let first = ppu.read_data(&cart); // buffered garbage
        let second = ppu.read_data(&cart);
        let _ = first;
        assert_eq!(second, 0x55);
    }

    #[test]
    fn test_palette_read_immediate() {
        let mut ppu = warmed_ppu();
        let mut cart = test_cart();

        ppu.write_addr(0x3F);
        ppu.write_addr(0x01);
        ppu.write_data(&mut cart, 0x2A);

        ppu.write_addr(0x3F);
        ppu.write_addr(0x01);
        assert_eq!(ppu.read_data(&cart) & 0x3F, 0x2A);
    }

    #[test]
    fn test_vram_increment_32() {
        let mut ppu = warmed_ppu();
        let mut cart = test_cart();
        ppu.write_ctrl(0x04).unwrap(); // +32 mode

        ppu.write_addr(0x20);
        ppu.write_addr(0x00);
        ppu.write_data(&mut cart, 0x11); // $2000
        ppu.write_data(&mut cart, 0x22); // $2020

        assert_eq!(ppu.vram.read(0x2000), 0x11);
        assert_eq!(ppu.vram.read(0x2020), 0x22);
    }

    #[test]
    fn test_chr_write_through_2007() {
        let mut ppu = warmed_ppu();
        let mut cart = test_cart(); // CHR RAM cart

        ppu.write_addr(0x00);
        ppu.write_addr(0x10);
        ppu.write_data(&mut cart, 0x99);
        assert_eq!(cart.ppu_read(0x0010), 0x99);
    }

    #[test]
    fn test_oam_data_roundtrip() {
        let mut ppu = warmed_ppu();
        ppu.write_oam_addr(0x10);
        ppu.write_oam_data(0x42);
        ppu.write_oam_addr(0x10);
        assert_eq!(ppu.read_oam_data(), 0x42);
    }

    #[test]
    fn test_vblank_set_point_reported_not_applied() {
        let mut ppu = warmed_ppu();
        let cart = test_cart();
        let mut fb = vec![0u32; FRAME_PIXELS];

        step_to(&mut ppu, &cart, 241, 0);
        let effects = ppu.step(&cart, &mut fb);
        assert!(effects.vblank_set_point);
        assert!(effects.frame_complete);
        // The PPU itself never sets a VBlank bit.
        assert_eq!(ppu.sprite_status_bits() & 0x80, 0);
    }

    #[test]
    fn test_vblank_clear_point_reported() {
        let mut ppu = warmed_ppu();
        let cart = test_cart();
        let mut fb = vec![0u32; FRAME_PIXELS];

        step_to(&mut ppu, &cart, 261, 0);
        let effects = ppu.step(&cart, &mut fb);
        assert!(effects.vblank_clear_point);
        assert!(!effects.vblank_set_point);
    }

    #[test]
    fn test_frame_complete_period_rendering_off() {
        let mut ppu = warmed_ppu();
        let cart = test_cart();
        let mut fb = vec![0u32; FRAME_PIXELS];

        // Two consecutive frame-complete signals must be exactly one
        // frame (89 342 dots with rendering off) apart.
        let mut gaps = Vec::new();
        let mut since_last = 0u64;
        for _ in 0..(89_342 * 3) {
            since_last += 1;
            if ppu.step(&cart, &mut fb).frame_complete {
                gaps.push(since_last);
                since_last = 0;
            }
        }
        assert!(gaps.len() >= 2);
        assert_eq!(gaps[1], 89_342);
    }

    #[test]
    fn test_backdrop_rendered_when_disabled() {
        let mut ppu = warmed_ppu();
        let mut cart = test_cart();
        let mut fb = vec![0u32; FRAME_PIXELS];

        // Set the backdrop to palette entry $21.
        ppu.write_addr(0x3F);
        ppu.write_addr(0x00);
        ppu.write_data(&mut cart, 0x21);

        step_to(&mut ppu, &cart, 10, 0);
        let mut fb2 = vec![0u32; FRAME_PIXELS];
        ppu.step(&cart, &mut fb2); // dot 1: pixel (0, 10)
        assert_eq!(fb2[10 * FRAME_WIDTH], crate::palette::PALETTE_RGBA[0x21]);
        let _ = fb;
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut ppu = Ppu::new(true);
        let mut cart = test_cart();
        let mut fb = vec![0u32; FRAME_PIXELS];

        ppu.write_oam_addr(3);
        ppu.write_oam_data(0x77);
        for _ in 0..10_000 {
            ppu.step(&cart, &mut fb);
        }
        ppu.write_data(&mut cart, 0x5A);

        let mut saved = Vec::new();
        ppu.save_state(&mut saved);

        let mut restored = Ppu::new(false);
        let mut pos = 0;
        restored.load_state(&saved, &mut pos).unwrap();
        assert_eq!(pos, saved.len());

        assert_eq!(restored.scanline(), ppu.scanline());
        assert_eq!(restored.dot(), ppu.dot());
        assert_eq!(restored.oam.bytes()[..], ppu.oam.bytes()[..]);
        assert_eq!(restored.warmup_dots, ppu.warmup_dots);

        // Both continue identically.
        let mut fb_a = vec![0u32; FRAME_PIXELS];
        let mut fb_b = vec![0u32; FRAME_PIXELS];
        for _ in 0..5_000 {
            let a = ppu.step(&cart, &mut fb_a);
            let b = restored.step(&cart, &mut fb_b);
            assert_eq!(a, b);
        }
        assert_eq!(fb_a, fb_b);
    }
}
