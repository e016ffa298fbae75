use super::memory::PpuMemory;
use super::registers::{
    MASK_GRAYSCALE, MASK_SHOW_BG, MASK_SHOW_BG_LEFT, MASK_SHOW_SPRITE_LEFT, MASK_SHOW_SPRITES,
    PpuRegisters,
};
use crate::nes::palette::NES_PALETTE;

pub const FRAME_WIDTH: usize = 256;
pub const FRAME_HEIGHT: usize = 240;
pub const FRAME_BYTES: usize = FRAME_WIDTH * FRAME_HEIGHT * 4;

pub const MAX_SPRITES_PER_LINE: usize = 8;

const SPRITE_PALETTE_MASK: u8 = 0x03;
const SPRITE_BEHIND_BG: u8 = 0x20;
const SPRITE_FLIP_H: u8 = 0x40;
const SPRITE_FLIP_V: u8 = 0x80;

/// One entry of the per-scanline sprite list. Pattern bytes are already
/// fetched and horizontally flipped, so bit 7 is the leftmost pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveSprite {
    pub oam_index: u8,
    pub x: u8,
    pub attributes: u8,
    pub pattern_lo: u8,
    pub pattern_hi: u8,
}

impl ActiveSprite {
    pub fn is_sprite0(&self) -> bool {
        self.oam_index == 0
    }

    /// 2-bit pixel at screen column `x`, 0 when outside the sprite.
    fn pixel_at(&self, x: usize) -> u8 {
        let column = x.wrapping_sub(self.x as usize);
        if column >= 8 {
            return 0;
        }
        let shift = 7 - column;
        let p0 = (self.pattern_lo >> shift) & 0x01;
        let p1 = (self.pattern_hi >> shift) & 0x01;
        (p1 << 1) | p0
    }
}

/// Result of sprite evaluation for one scanline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteEvaluation {
    pub selected: usize,
    pub overflow: bool,
}

/// Background fetch pipeline, per-line sprite list and the two RGBA frame
/// buffers.
pub struct Renderer {
    next_tile_id: u8,
    next_tile_attr: u8,
    next_tile_lsb: u8,
    next_tile_msb: u8,
    bg_shift_pattern_lo: u16,
    bg_shift_pattern_hi: u16,
    bg_shift_attr_lo: u16,
    bg_shift_attr_hi: u16,

    sprites: [ActiveSprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,

    back: Vec<u8>,
    front: Vec<u8>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            next_tile_id: 0,
            next_tile_attr: 0,
            next_tile_lsb: 0,
            next_tile_msb: 0,
            bg_shift_pattern_lo: 0,
            bg_shift_pattern_hi: 0,
            bg_shift_attr_lo: 0,
            bg_shift_attr_hi: 0,
            sprites: [ActiveSprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            back: vec![0; FRAME_BYTES],
            front: vec![0; FRAME_BYTES],
        }
    }

    pub fn reset(&mut self) {
        let back = std::mem::take(&mut self.back);
        let front = std::mem::take(&mut self.front);
        *self = Self {
            back,
            front,
            ..Self::new()
        };
    }

    /// Last complete frame.
    pub fn frame_buffer(&self) -> &[u8] {
        &self.front
    }

    /// Swaps the finished back buffer to the front.
    pub fn publish(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    pub fn active_sprites(&self) -> &[ActiveSprite] {
        &self.sprites[..self.sprite_count]
    }

    pub fn clear_sprites(&mut self) {
        self.sprite_count = 0;
    }

    /// One dot of the 8-dot nametable/attribute/pattern fetch cycle. Runs on
    /// dots 1-257 and 321-337, before the dot's pixel is composited.
    /// Shifters move on dots 2-257 and 322-337 and reload from the latches
    /// on 9, 17, ..., 257, 329 and 337, so a tile loaded at 329 has shifted
    /// eight times when x=0 is drawn.
    pub fn fetch_background(&mut self, regs: &mut PpuRegisters, memory: &PpuMemory, dot: u16) {
        if (2..=257).contains(&dot) || (322..=337).contains(&dot) {
            self.shift_background_registers();
        }

        match (dot - 1) & 0x07 {
            0 => {
                self.load_background_shifters();
                self.next_tile_id = memory.read(regs.tile_addr());
            }
            2 => {
                let attr = memory.read(regs.attribute_addr());
                self.next_tile_attr = (attr >> regs.attribute_shift()) & 0x03;
            }
            4 => {
                let addr = regs.background_table() + (self.next_tile_id as u16) * 16 + regs.fine_y();
                self.next_tile_lsb = memory.read(addr);
            }
            6 => {
                let addr =
                    regs.background_table() + (self.next_tile_id as u16) * 16 + regs.fine_y() + 8;
                self.next_tile_msb = memory.read(addr);
            }
            7 => regs.increment_coarse_x(),
            _ => {}
        }
    }

    fn load_background_shifters(&mut self) {
        self.bg_shift_pattern_lo = (self.bg_shift_pattern_lo & 0xFF00) | self.next_tile_lsb as u16;
        self.bg_shift_pattern_hi = (self.bg_shift_pattern_hi & 0xFF00) | self.next_tile_msb as u16;

        let attr_lo = if (self.next_tile_attr & 0x01) != 0 { 0xFF } else { 0x00 };
        let attr_hi = if (self.next_tile_attr & 0x02) != 0 { 0xFF } else { 0x00 };
        self.bg_shift_attr_lo = (self.bg_shift_attr_lo & 0xFF00) | attr_lo;
        self.bg_shift_attr_hi = (self.bg_shift_attr_hi & 0xFF00) | attr_hi;
    }

    fn shift_background_registers(&mut self) {
        self.bg_shift_pattern_lo <<= 1;
        self.bg_shift_pattern_hi <<= 1;
        self.bg_shift_attr_lo <<= 1;
        self.bg_shift_attr_hi <<= 1;
    }

    /// Builds the sprite list for `scanline` by scanning OAM in index order.
    /// A sprite with Y byte `y` covers scanlines `y+1 ..= y+height`.
    pub fn evaluate_sprites(
        &mut self,
        regs: &PpuRegisters,
        memory: &PpuMemory,
        oam: &[u8; 256],
        scanline: u16,
    ) -> SpriteEvaluation {
        self.sprite_count = 0;
        let height = regs.sprite_height();
        let mut overflow = false;

        for (index, entry) in oam.chunks_exact(4).enumerate() {
            let top = entry[0] as u16 + 1;
            if scanline < top || scanline >= top + height {
                continue;
            }
            if self.sprite_count == MAX_SPRITES_PER_LINE {
                overflow = true;
                break;
            }

            let tile_index = entry[1];
            let attributes = entry[2];
            let mut row = scanline - top;
            if (attributes & SPRITE_FLIP_V) != 0 {
                row = height - 1 - row;
            }

            let addr = if height == 16 {
                let table = ((tile_index & 0x01) as u16) * 0x1000;
                let tile = ((tile_index & 0xFE) as u16) + row / 8;
                table + tile * 16 + (row & 0x07)
            } else {
                regs.sprite_table() + (tile_index as u16) * 16 + row
            };

            let mut pattern_lo = memory.read(addr);
            let mut pattern_hi = memory.read(addr + 8);
            if (attributes & SPRITE_FLIP_H) != 0 {
                pattern_lo = pattern_lo.reverse_bits();
                pattern_hi = pattern_hi.reverse_bits();
            }

            self.sprites[self.sprite_count] = ActiveSprite {
                oam_index: index as u8,
                x: entry[3],
                attributes,
                pattern_lo,
                pattern_hi,
            };
            self.sprite_count += 1;
        }

        SpriteEvaluation {
            selected: self.sprite_count,
            overflow,
        }
    }

    /// Composites the pixel at (`x`, `y`) into the back buffer. Returns true
    /// when this pixel is a sprite-0 hit.
    pub fn render_pixel(
        &mut self,
        regs: &PpuRegisters,
        memory: &PpuMemory,
        x: usize,
        y: usize,
    ) -> bool {
        let (bg_pixel, bg_palette) = self.background_sample(regs, x);
        let (spr_pixel, spr_palette, spr_behind_bg) = self.sprite_sample(regs, x);
        let bg_opaque = bg_pixel != 0;

        let sprite0_hit = bg_opaque && x < 255 && self.sprite0_pixel(regs, x) != 0;

        let palette_index = if spr_pixel != 0 && (!spr_behind_bg || !bg_opaque) {
            0x10 | (spr_palette << 2) | spr_pixel
        } else if bg_opaque {
            (bg_palette << 2) | bg_pixel
        } else {
            0
        };

        let mut color = memory.palette_entry(palette_index) & 0x3F;
        if (regs.mask & MASK_GRAYSCALE) != 0 {
            color &= 0x30;
        }
        let rgb = NES_PALETTE[color as usize];
        let pixel = (y * FRAME_WIDTH + x) * 4;
        self.back[pixel..pixel + 4].copy_from_slice(&[rgb[0], rgb[1], rgb[2], 0xFF]);

        sprite0_hit
    }

    fn background_sample(&self, regs: &PpuRegisters, x: usize) -> (u8, u8) {
        if (regs.mask & MASK_SHOW_BG) == 0 {
            return (0, 0);
        }
        if x < 8 && (regs.mask & MASK_SHOW_BG_LEFT) == 0 {
            return (0, 0);
        }

        let bit = 0x8000u16 >> regs.fine_x;
        let p0 = ((self.bg_shift_pattern_lo & bit) != 0) as u8;
        let p1 = ((self.bg_shift_pattern_hi & bit) != 0) as u8;
        let a0 = ((self.bg_shift_attr_lo & bit) != 0) as u8;
        let a1 = ((self.bg_shift_attr_hi & bit) != 0) as u8;

        ((p1 << 1) | p0, (a1 << 1) | a0)
    }

    fn sprites_visible(regs: &PpuRegisters, x: usize) -> bool {
        if (regs.mask & MASK_SHOW_SPRITES) == 0 {
            return false;
        }
        x >= 8 || (regs.mask & MASK_SHOW_SPRITE_LEFT) != 0
    }

    /// First opaque sprite in OAM order wins.
    fn sprite_sample(&self, regs: &PpuRegisters, x: usize) -> (u8, u8, bool) {
        if !Self::sprites_visible(regs, x) {
            return (0, 0, false);
        }

        self.active_sprites()
            .iter()
            .find_map(|sprite| {
                let pixel = sprite.pixel_at(x);
                (pixel != 0).then(|| {
                    (
                        pixel,
                        sprite.attributes & SPRITE_PALETTE_MASK,
                        (sprite.attributes & SPRITE_BEHIND_BG) != 0,
                    )
                })
            })
            .unwrap_or((0, 0, false))
    }

    fn sprite0_pixel(&self, regs: &PpuRegisters, x: usize) -> u8 {
        if !Self::sprites_visible(regs, x) {
            return 0;
        }
        self.active_sprites()
            .iter()
            .find(|sprite| sprite.is_sprite0())
            .map_or(0, |sprite| sprite.pixel_at(x))
    }
}
