mod memory;
mod registers;
mod renderer;

pub use memory::PpuMemory;
pub use registers::{
    CTRL_NMI_ENABLE, CTRL_VRAM_INC_32, MASK_SHOW_BG, MASK_SHOW_SPRITES, PpuRegisters,
    STATUS_SPRITE_OVERFLOW, STATUS_SPRITE_ZERO_HIT, STATUS_VBLANK,
};
pub use renderer::{ActiveSprite, FRAME_BYTES, FRAME_HEIGHT, FRAME_WIDTH, Renderer};

use super::bus::PpuPort;
use super::mapper::Mirroring;

pub const DOTS_PER_SCANLINE: u16 = 341;
pub const SCANLINES_PER_FRAME: u16 = 262;
pub const VISIBLE_SCANLINES: u16 = 240;
pub const VBLANK_SCANLINE: u16 = 241;
pub const PRE_RENDER_SCANLINE: u16 = 261;

pub const PPUCTRL: u8 = 0;
pub const PPUMASK: u8 = 1;
pub const PPUSTATUS: u8 = 2;
pub const OAMADDR: u8 = 3;
pub const OAMDATA: u8 = 4;
pub const PPUSCROLL: u8 = 5;
pub const PPUADDR: u8 = 6;
pub const PPUDATA: u8 = 7;

#[derive(Debug, Clone, Copy, Default)]
pub struct PpuDebugCounters {
    pub dots: u64,
    pub frames: u64,
    pub vblank_entries: u64,
    pub nmi_edges: u64,
    pub sprite_overflow_events: u64,
    pub sprite0_hit_events: u64,
    pub sprite0_hit_last_scanline: u16,
    pub sprite0_hit_last_dot: u16,
    pub status_reads: u64,
    pub data_reads: u64,
    pub data_writes: u64,
}

/// The 2C02: dot/scanline sequencer that drives the register file, the
/// renderer and VRAM.
pub struct Ppu {
    regs: PpuRegisters,
    memory: PpuMemory,
    oam: [u8; 256],
    renderer: Renderer,

    scanline: u16,
    dot: u16,
    odd_frame: bool,
    frame_ready: bool,
    nmi_line: bool,
    nmi_pending: bool,

    debug: PpuDebugCounters,
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            regs: PpuRegisters::default(),
            memory: PpuMemory::new(),
            oam: [0; 256],
            renderer: Renderer::new(),
            scanline: 0,
            dot: 0,
            odd_frame: false,
            frame_ready: false,
            nmi_line: false,
            nmi_pending: false,
            debug: PpuDebugCounters::default(),
        }
    }

    /// Back to scanline 0, dot 0 with a cleared register file. Pattern
    /// memory and OAM survive.
    pub fn reset(&mut self) {
        self.regs = PpuRegisters::default();
        self.memory.reset();
        self.renderer.reset();
        self.scanline = 0;
        self.dot = 0;
        self.odd_frame = false;
        self.frame_ready = false;
        self.nmi_line = false;
        self.nmi_pending = false;
        self.debug = PpuDebugCounters::default();
    }

    pub fn load_chr(&mut self, chr: &[u8], is_ram: bool) {
        self.memory.load_chr(chr, is_ram);
    }

    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        self.memory.set_mirroring(mirroring);
    }

    pub fn mirroring(&self) -> Mirroring {
        self.memory.mirroring()
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    pub fn frame_count(&self) -> u64 {
        self.debug.frames
    }

    /// Last published frame, RGBA8, row-major.
    pub fn frame_buffer(&self) -> &[u8] {
        self.renderer.frame_buffer()
    }

    /// True once after each frame is published.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    /// Pending NMI edge, consumed by the caller.
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    pub fn registers(&self) -> &PpuRegisters {
        &self.regs
    }

    pub fn active_sprites(&self) -> &[ActiveSprite] {
        self.renderer.active_sprites()
    }

    pub fn debug_counters(&self) -> PpuDebugCounters {
        self.debug
    }

    /// VRAM through the mirror table, no side effects.
    pub fn peek_vram(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    pub fn peek_palette(&self, index: usize) -> u8 {
        self.memory.peek_palette(index)
    }

    pub fn peek_oam(&self, index: usize) -> u8 {
        self.oam[index % self.oam.len()]
    }

    /// Advances one dot.
    pub fn clock(&mut self) {
        self.debug.dots = self.debug.dots.wrapping_add(1);

        let visible_line = self.scanline < VISIBLE_SCANLINES;
        let pre_render = self.scanline == PRE_RENDER_SCANLINE;
        let rendering_enabled = self.regs.rendering_enabled();

        if pre_render && self.dot == 1 {
            self.regs.status &= !(STATUS_VBLANK | STATUS_SPRITE_ZERO_HIT | STATUS_SPRITE_OVERFLOW);
            self.update_nmi_line();
        }

        if self.scanline == VBLANK_SCANLINE && self.dot == 1 {
            self.renderer.publish();
            self.frame_ready = true;
            self.debug.frames = self.debug.frames.wrapping_add(1);
            self.debug.vblank_entries = self.debug.vblank_entries.wrapping_add(1);
            self.regs.status |= STATUS_VBLANK;
            self.update_nmi_line();
        }

        if visible_line && self.dot == 0 {
            self.evaluate_sprites(rendering_enabled);
        }

        let render_line = visible_line || pre_render;

        if render_line && rendering_enabled {
            if (1..=257).contains(&self.dot) || (321..=337).contains(&self.dot) {
                self.renderer.fetch_background(&mut self.regs, &self.memory, self.dot);
            }

            if self.dot == 256 {
                self.regs.increment_y();
            }

            if self.dot == 257 {
                self.regs.copy_horizontal_bits();
            }

            if pre_render && (280..=304).contains(&self.dot) {
                self.regs.copy_vertical_bits();
            }
        }

        if visible_line && (1..=256).contains(&self.dot) {
            let x = (self.dot - 1) as usize;
            let hit = self
                .renderer
                .render_pixel(&self.regs, &self.memory, x, self.scanline as usize);
            if hit && (self.regs.status & STATUS_SPRITE_ZERO_HIT) == 0 {
                self.regs.status |= STATUS_SPRITE_ZERO_HIT;
                self.debug.sprite0_hit_events = self.debug.sprite0_hit_events.wrapping_add(1);
                self.debug.sprite0_hit_last_scanline = self.scanline;
                self.debug.sprite0_hit_last_dot = self.dot;
            }
        }

        if render_line && (257..=320).contains(&self.dot) {
            self.regs.oam_addr = 0;
        }

        // Odd frames drop the last dot of the pre-render line.
        if rendering_enabled && pre_render && self.odd_frame && self.dot == 339 {
            self.dot = 0;
            self.scanline = 0;
            self.odd_frame = false;
            return;
        }

        self.dot += 1;
        if self.dot >= DOTS_PER_SCANLINE {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline >= SCANLINES_PER_FRAME {
                self.scanline = 0;
                self.odd_frame = !self.odd_frame;
            }
        }
    }

    fn evaluate_sprites(&mut self, rendering_enabled: bool) {
        if !rendering_enabled {
            self.renderer.clear_sprites();
            return;
        }

        let result = self
            .renderer
            .evaluate_sprites(&self.regs, &self.memory, &self.oam, self.scanline);
        if result.overflow && (self.regs.status & STATUS_SPRITE_OVERFLOW) == 0 {
            self.regs.status |= STATUS_SPRITE_OVERFLOW;
            self.debug.sprite_overflow_events = self.debug.sprite_overflow_events.wrapping_add(1);
        }
    }

    /// NMI output is CTRL bit 7 AND vblank; the CPU sees its rising edge.
    fn update_nmi_line(&mut self) {
        let line = self.regs.nmi_enabled() && self.regs.in_vblank();
        if line && !self.nmi_line {
            self.nmi_pending = true;
            self.debug.nmi_edges = self.debug.nmi_edges.wrapping_add(1);
        }
        self.nmi_line = line;
    }

    fn read_data(&mut self) -> u8 {
        self.debug.data_reads = self.debug.data_reads.wrapping_add(1);
        let addr = self.regs.vram_addr();
        let value = self.memory.read(addr);
        let result = if addr >= 0x3F00 {
            // Palette reads bypass the buffer, which picks up the nametable
            // byte underneath instead.
            self.regs.read_buffer = self.memory.read(addr - 0x1000);
            value
        } else {
            std::mem::replace(&mut self.regs.read_buffer, value)
        };
        self.regs.increment_vram_addr();
        result
    }

    fn write_data(&mut self, value: u8) {
        self.debug.data_writes = self.debug.data_writes.wrapping_add(1);
        self.memory.write(self.regs.vram_addr(), value);
        self.regs.increment_vram_addr();
    }
}

impl PpuPort for Ppu {
    fn read_register(&mut self, index: u8) -> u8 {
        let value = match index & 0x07 {
            PPUSTATUS => {
                self.debug.status_reads = self.debug.status_reads.wrapping_add(1);
                let value = self.regs.read_status();
                self.update_nmi_line();
                value
            }
            OAMDATA => self.oam[self.regs.oam_addr as usize],
            PPUDATA => self.read_data(),
            _ => self.regs.open_bus,
        };
        self.regs.open_bus = value;
        value
    }

    fn write_register(&mut self, index: u8, value: u8) {
        self.regs.open_bus = value;
        match index & 0x07 {
            PPUCTRL => {
                self.regs.write_ctrl(value);
                self.update_nmi_line();
            }
            PPUMASK => self.regs.mask = value,
            OAMADDR => self.regs.oam_addr = value,
            OAMDATA => {
                self.oam[self.regs.oam_addr as usize] = value;
                self.regs.oam_addr = self.regs.oam_addr.wrapping_add(1);
            }
            PPUSCROLL => self.regs.write_scroll(value),
            PPUADDR => self.regs.write_addr(value),
            PPUDATA => self.write_data(value),
            _ => {}
        }
    }

    fn peek_register(&self, index: u8) -> u8 {
        match index & 0x07 {
            PPUSTATUS => self.regs.peek_status(),
            OAMDATA => self.oam[self.regs.oam_addr as usize],
            PPUDATA => {
                let addr = self.regs.vram_addr();
                if addr >= 0x3F00 {
                    self.memory.read(addr)
                } else {
                    self.regs.read_buffer
                }
            }
            _ => self.regs.open_bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::registers::MASK_SHOW_BG_LEFT;
    use super::*;

    fn run_to(ppu: &mut Ppu, scanline: u16, dot: u16) {
        let mut guard = 0u32;
        while !(ppu.scanline() == scanline && ppu.dot() == dot) {
            ppu.clock();
            guard += 1;
            assert!(guard < 200_000, "never reached {scanline}/{dot}");
        }
    }

    fn set_addr(ppu: &mut Ppu, addr: u16) {
        ppu.write_register(PPUADDR, (addr >> 8) as u8);
        ppu.write_register(PPUADDR, addr as u8);
    }

    /// Tile 0 opaque only in its leftmost column, tile 1 fully opaque,
    /// nametable 0 filled with tile 0, BG colour 1 = $16 over a $0F backdrop.
    fn left_column_tiles(ppu: &mut Ppu) {
        for row in 0..8 {
            set_addr(ppu, row);
            ppu.write_register(PPUDATA, 0x80);
            set_addr(ppu, 0x0010 + row);
            ppu.write_register(PPUDATA, 0xFF);
        }
        set_addr(ppu, 0x2000);
        for _ in 0..32 * 30 {
            ppu.write_register(PPUDATA, 0x00);
        }
        set_addr(ppu, 0x3F00);
        ppu.write_register(PPUDATA, 0x0F);
        ppu.write_register(PPUDATA, 0x16);
        set_addr(ppu, 0x0000);
        ppu.write_register(PPUCTRL, 0);
    }

    #[test]
    fn status_read_returns_stale_low_bits_and_clears_vblank() {
        let mut ppu = Ppu::new();
        run_to(&mut ppu, VBLANK_SCANLINE, 2);
        ppu.write_register(PPUMASK, 0x1F);

        assert_eq!(ppu.read_register(PPUSTATUS), 0x80 | 0x1F);
        assert_eq!(ppu.read_register(PPUSTATUS) & 0x80, 0);
    }

    #[test]
    fn status_read_resets_write_toggle() {
        let mut ppu = Ppu::new();
        ppu.write_register(PPUADDR, 0x21);
        ppu.read_register(PPUSTATUS);
        set_addr(&mut ppu, 0x2345);
        assert_eq!(ppu.registers().v, 0x2345);
    }

    #[test]
    fn vblank_and_nmi_at_241_1() {
        let mut ppu = Ppu::new();
        ppu.write_register(PPUCTRL, CTRL_NMI_ENABLE);
        run_to(&mut ppu, VBLANK_SCANLINE, 1);
        assert!(!ppu.registers().in_vblank());
        assert!(!ppu.take_nmi());

        ppu.clock();
        assert!(ppu.registers().in_vblank());
        assert!(ppu.take_nmi());
        assert!(!ppu.take_nmi());
        assert!(ppu.take_frame_ready());
        assert_eq!(ppu.frame_count(), 1);
    }

    #[test]
    fn no_nmi_when_disabled_until_ctrl_enables_it() {
        let mut ppu = Ppu::new();
        run_to(&mut ppu, VBLANK_SCANLINE, 10);
        assert!(!ppu.take_nmi());

        ppu.write_register(PPUCTRL, CTRL_NMI_ENABLE);
        assert!(ppu.take_nmi());
        ppu.write_register(PPUCTRL, CTRL_NMI_ENABLE);
        assert!(!ppu.take_nmi());
    }

    #[test]
    fn pre_render_line_clears_flags() {
        let mut ppu = Ppu::new();
        run_to(&mut ppu, VBLANK_SCANLINE, 5);
        ppu.regs.status |= STATUS_SPRITE_ZERO_HIT | STATUS_SPRITE_OVERFLOW;
        run_to(&mut ppu, PRE_RENDER_SCANLINE, 2);
        assert_eq!(ppu.registers().status & 0xE0, 0);
    }

    #[test]
    fn frame_is_89342_dots_with_rendering_off() {
        let mut ppu = Ppu::new();
        run_to(&mut ppu, VBLANK_SCANLINE, 2);
        let start = ppu.debug_counters().dots;
        ppu.take_frame_ready();
        while !ppu.take_frame_ready() {
            ppu.clock();
        }
        assert_eq!(ppu.debug_counters().dots - start, 341 * 262);
    }

    #[test]
    fn odd_frames_skip_a_dot_when_rendering() {
        let mut ppu = Ppu::new();
        ppu.write_register(PPUMASK, MASK_SHOW_BG);
        run_to(&mut ppu, VBLANK_SCANLINE, 2);
        ppu.take_frame_ready();

        let mut lengths = Vec::new();
        for _ in 0..2 {
            let start = ppu.debug_counters().dots;
            while !ppu.take_frame_ready() {
                ppu.clock();
            }
            lengths.push(ppu.debug_counters().dots - start);
        }
        lengths.sort_unstable();
        assert_eq!(lengths, vec![341 * 262 - 1, 341 * 262]);
    }

    #[test]
    fn data_reads_are_buffered_outside_palette() {
        let mut ppu = Ppu::new();
        set_addr(&mut ppu, 0x2105);
        ppu.write_register(PPUDATA, 0x11);
        ppu.write_register(PPUDATA, 0x22);

        set_addr(&mut ppu, 0x2105);
        let _stale = ppu.read_register(PPUDATA);
        assert_eq!(ppu.read_register(PPUDATA), 0x11);
        assert_eq!(ppu.read_register(PPUDATA), 0x22);
    }

    #[test]
    fn palette_reads_are_immediate_and_refill_buffer() {
        let mut ppu = Ppu::new();
        set_addr(&mut ppu, 0x2F05);
        ppu.write_register(PPUDATA, 0x66);
        set_addr(&mut ppu, 0x3F05);
        ppu.write_register(PPUDATA, 0x27);

        set_addr(&mut ppu, 0x3F05);
        assert_eq!(ppu.read_register(PPUDATA), 0x27);
        assert_eq!(ppu.registers().read_buffer, 0x66);
    }

    #[test]
    fn data_access_increments_by_1_or_32() {
        let mut ppu = Ppu::new();
        set_addr(&mut ppu, 0x2000);
        ppu.write_register(PPUDATA, 0x01);
        assert_eq!(ppu.registers().v, 0x2001);

        ppu.write_register(PPUCTRL, CTRL_VRAM_INC_32);
        ppu.write_register(PPUDATA, 0x02);
        assert_eq!(ppu.registers().v, 0x2021);
        ppu.read_register(PPUDATA);
        assert_eq!(ppu.registers().v, 0x2041);

        assert_eq!(ppu.peek_vram(0x2000), 0x01);
        assert_eq!(ppu.peek_vram(0x2001), 0x02);
    }

    #[test]
    fn oamdata_round_trip_with_fixed_address() {
        let mut ppu = Ppu::new();
        ppu.write_register(OAMADDR, 0x40);
        ppu.write_register(OAMDATA, 0xAB);
        assert_eq!(ppu.registers().oam_addr, 0x41);

        ppu.write_register(OAMADDR, 0x40);
        assert_eq!(ppu.read_register(OAMDATA), 0xAB);
        assert_eq!(ppu.read_register(OAMDATA), 0xAB);
        assert_eq!(ppu.registers().oam_addr, 0x40);
    }

    #[test]
    fn oamaddr_forced_to_zero_on_dots_257_to_320() {
        let mut ppu = Ppu::new();
        ppu.write_register(PPUMASK, MASK_SHOW_SPRITES);
        run_to(&mut ppu, 10, 200);
        ppu.write_register(OAMADDR, 0x80);
        run_to(&mut ppu, 10, 258);
        assert_eq!(ppu.registers().oam_addr, 0);

        ppu.write_register(PPUMASK, 0);
        run_to(&mut ppu, 11, 200);
        ppu.write_register(OAMADDR, 0x80);
        run_to(&mut ppu, 11, 300);
        assert_eq!(ppu.registers().oam_addr, 0);

        // Only render lines force it.
        run_to(&mut ppu, VBLANK_SCANLINE, 0);
        ppu.write_register(OAMADDR, 0x80);
        run_to(&mut ppu, VBLANK_SCANLINE, 300);
        assert_eq!(ppu.registers().oam_addr, 0x80);
    }

    #[test]
    fn writes_refresh_open_bus() {
        let mut ppu = Ppu::new();
        ppu.write_register(PPUMASK, 0x5A);
        assert_eq!(ppu.read_register(PPUSCROLL), 0x5A);
        assert_eq!(ppu.peek_register(PPUSTATUS) & 0x1F, 0x1A);
    }

    #[test]
    fn sprite_overflow_set_during_rendering() {
        let mut ppu = Ppu::new();
        ppu.write_register(OAMADDR, 0);
        for _ in 0..256 {
            ppu.write_register(OAMDATA, 0xFF);
        }
        for i in 0..9u8 {
            ppu.write_register(OAMADDR, i * 4);
            for byte in [50, 0, 0, i * 8] {
                ppu.write_register(OAMDATA, byte);
            }
        }
        ppu.write_register(PPUMASK, MASK_SHOW_SPRITES);
        run_to(&mut ppu, 51, 1);
        assert_eq!(ppu.registers().status & STATUS_SPRITE_OVERFLOW, STATUS_SPRITE_OVERFLOW);
        assert_eq!(ppu.active_sprites().len(), 8);
        assert_eq!(ppu.debug_counters().sprite_overflow_events, 1);
    }

    #[test]
    fn sprite0_hit_against_background() {
        let mut ppu = Ppu::new();
        // Tile 1 solid in plane 0 for both layers.
        for row in 0..8 {
            set_addr(&mut ppu, 0x0010 + row);
            ppu.write_register(PPUDATA, 0xFF);
        }
        set_addr(&mut ppu, 0x2000);
        for _ in 0..32 * 30 {
            ppu.write_register(PPUDATA, 0x01);
        }
        ppu.write_register(OAMADDR, 0);
        for byte in [20, 1, 0, 40] {
            ppu.write_register(OAMDATA, byte);
        }
        set_addr(&mut ppu, 0x0000);
        ppu.write_register(PPUSCROLL, 0);
        ppu.write_register(PPUSCROLL, 0);
        ppu.write_register(PPUCTRL, 0);

        // Let the pre-render line load v from t before enabling output.
        run_to(&mut ppu, PRE_RENDER_SCANLINE, 0);
        ppu.write_register(PPUMASK, MASK_SHOW_BG | MASK_SHOW_SPRITES);
        run_to(&mut ppu, 21, 0);
        assert_eq!(ppu.registers().status & STATUS_SPRITE_ZERO_HIT, 0);

        run_to(&mut ppu, 21, 60);
        assert_eq!(
            ppu.registers().status & STATUS_SPRITE_ZERO_HIT,
            STATUS_SPRITE_ZERO_HIT
        );
        assert_eq!(ppu.debug_counters().sprite0_hit_last_scanline, 21);
        assert_eq!(ppu.debug_counters().sprite0_hit_last_dot, 41);
    }

    #[test]
    fn background_pixels_land_on_their_tile_columns() {
        let mut ppu = Ppu::new();
        left_column_tiles(&mut ppu);
        run_to(&mut ppu, PRE_RENDER_SCANLINE, 0);
        ppu.write_register(PPUMASK, MASK_SHOW_BG | MASK_SHOW_BG_LEFT);
        run_to(&mut ppu, VBLANK_SCANLINE, 2);

        let palette = crate::nes::palette::NES_PALETTE;
        let frame = ppu.frame_buffer();
        let at = |x: usize, y: usize| {
            let i = (y * FRAME_WIDTH + x) * 4;
            [frame[i], frame[i + 1], frame[i + 2]]
        };
        for y in [0, 16, 239] {
            for x in [0, 8, 16, 248] {
                assert_eq!(at(x, y), palette[0x16], "x={x} y={y}");
            }
            for x in [1, 7, 9, 17, 255] {
                assert_eq!(at(x, y), palette[0x0F], "x={x} y={y}");
            }
        }
    }

    #[test]
    fn fine_x_scroll_moves_background_left() {
        let mut ppu = Ppu::new();
        left_column_tiles(&mut ppu);
        ppu.write_register(PPUSCROLL, 3);
        ppu.write_register(PPUSCROLL, 0);
        run_to(&mut ppu, PRE_RENDER_SCANLINE, 0);
        ppu.write_register(PPUMASK, MASK_SHOW_BG | MASK_SHOW_BG_LEFT);
        run_to(&mut ppu, VBLANK_SCANLINE, 2);

        let palette = crate::nes::palette::NES_PALETTE;
        let frame = ppu.frame_buffer();
        let red = |x: usize| frame[(16 * FRAME_WIDTH + x) * 4];
        assert_eq!(red(5), palette[0x16][0]);
        assert_eq!(red(13), palette[0x16][0]);
        assert_eq!(red(0), palette[0x0F][0]);
        assert_eq!(red(6), palette[0x0F][0]);
    }

    #[test]
    fn sprite0_hit_on_first_shared_opaque_column() {
        let mut ppu = Ppu::new();
        left_column_tiles(&mut ppu);
        // Solid sprite 0 over x=44..=51; background is opaque only at x=48.
        ppu.write_register(OAMADDR, 0);
        for byte in [20, 1, 0, 44] {
            ppu.write_register(OAMDATA, byte);
        }

        run_to(&mut ppu, PRE_RENDER_SCANLINE, 0);
        ppu.write_register(PPUMASK, MASK_SHOW_BG | MASK_SHOW_SPRITES);
        run_to(&mut ppu, 21, 49);
        assert_eq!(ppu.registers().status & STATUS_SPRITE_ZERO_HIT, 0);

        ppu.clock();
        assert_eq!(
            ppu.registers().status & STATUS_SPRITE_ZERO_HIT,
            STATUS_SPRITE_ZERO_HIT
        );
        assert_eq!(ppu.debug_counters().sprite0_hit_last_dot, 49);
    }

    #[test]
    fn published_frame_shows_backdrop() {
        let mut ppu = Ppu::new();
        set_addr(&mut ppu, 0x3F00);
        ppu.write_register(PPUDATA, 0x21);
        run_to(&mut ppu, VBLANK_SCANLINE, 2);

        let frame = ppu.frame_buffer();
        assert_eq!(frame.len(), FRAME_BYTES);
        let rgb = crate::nes::palette::NES_PALETTE[0x21];
        assert_eq!(&frame[..3], rgb);
        assert_eq!(frame[3], 0xFF);
    }
}
