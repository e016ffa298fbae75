pub const CTRL_NAMETABLE: u8 = 0x03;
pub const CTRL_VRAM_INC_32: u8 = 0x04;
pub const CTRL_SPRITE_TABLE: u8 = 0x08;
pub const CTRL_BG_TABLE: u8 = 0x10;
pub const CTRL_SPRITE_SIZE_16: u8 = 0x20;
pub const CTRL_NMI_ENABLE: u8 = 0x80;

pub const MASK_GRAYSCALE: u8 = 0x01;
pub const MASK_SHOW_BG_LEFT: u8 = 0x02;
pub const MASK_SHOW_SPRITE_LEFT: u8 = 0x04;
pub const MASK_SHOW_BG: u8 = 0x08;
pub const MASK_SHOW_SPRITES: u8 = 0x10;

pub const STATUS_SPRITE_OVERFLOW: u8 = 0x20;
pub const STATUS_SPRITE_ZERO_HIT: u8 = 0x40;
pub const STATUS_VBLANK: u8 = 0x80;

/// CPU-visible register file plus the internal scroll latches.
///
/// `v`, `t` are the 15-bit VRAM address registers laid out as
/// `yyy NN YYYYY XXXXX` (fine Y, nametable, coarse Y, coarse X).
#[derive(Debug, Clone, Copy, Default)]
pub struct PpuRegisters {
    pub ctrl: u8,
    pub mask: u8,
    pub status: u8,
    pub oam_addr: u8,
    pub v: u16,
    pub t: u16,
    pub fine_x: u8,
    pub write_toggle: bool,
    pub read_buffer: u8,
    pub open_bus: u8,
}

impl PpuRegisters {
    pub fn rendering_enabled(&self) -> bool {
        (self.mask & (MASK_SHOW_BG | MASK_SHOW_SPRITES)) != 0
    }

    pub fn nmi_enabled(&self) -> bool {
        (self.ctrl & CTRL_NMI_ENABLE) != 0
    }

    pub fn in_vblank(&self) -> bool {
        (self.status & STATUS_VBLANK) != 0
    }

    pub fn sprite_height(&self) -> u16 {
        if (self.ctrl & CTRL_SPRITE_SIZE_16) != 0 {
            16
        } else {
            8
        }
    }

    pub fn background_table(&self) -> u16 {
        if (self.ctrl & CTRL_BG_TABLE) != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    pub fn sprite_table(&self) -> u16 {
        if (self.ctrl & CTRL_SPRITE_TABLE) != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    /// $2002 read. Returns the flag bits over the stale low bits of the
    /// latch, then clears vblank and the write toggle.
    pub fn read_status(&mut self) -> u8 {
        let value = (self.status & 0xE0) | (self.open_bus & 0x1F);
        self.status &= !STATUS_VBLANK;
        self.write_toggle = false;
        value
    }

    pub fn peek_status(&self) -> u8 {
        (self.status & 0xE0) | (self.open_bus & 0x1F)
    }

    pub fn write_ctrl(&mut self, value: u8) {
        self.ctrl = value;
        self.t = (self.t & !0x0C00) | (((value & CTRL_NAMETABLE) as u16) << 10);
    }

    pub fn write_scroll(&mut self, value: u8) {
        if !self.write_toggle {
            self.fine_x = value & 0x07;
            self.t = (self.t & !0x001F) | ((value as u16) >> 3);
        } else {
            self.t = (self.t & !0x03E0) | (((value as u16) >> 3) << 5);
            self.t = (self.t & !0x7000) | (((value as u16) & 0x07) << 12);
        }
        self.write_toggle = !self.write_toggle;
    }

    pub fn write_addr(&mut self, value: u8) {
        if !self.write_toggle {
            self.t = (self.t & 0x00FF) | (((value as u16) & 0x3F) << 8);
        } else {
            self.t = (self.t & 0x7F00) | value as u16;
            self.v = self.t;
        }
        self.write_toggle = !self.write_toggle;
    }

    /// Address for the next $2007 access.
    pub fn vram_addr(&self) -> u16 {
        self.v & 0x3FFF
    }

    pub fn increment_vram_addr(&mut self) {
        let step = if (self.ctrl & CTRL_VRAM_INC_32) != 0 {
            32
        } else {
            1
        };
        self.v = self.v.wrapping_add(step) & 0x7FFF;
    }

    pub fn increment_coarse_x(&mut self) {
        if (self.v & 0x001F) == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v = self.v.wrapping_add(1);
        }
    }

    pub fn increment_y(&mut self) {
        if (self.v & 0x7000) != 0x7000 {
            self.v = self.v.wrapping_add(0x1000);
            return;
        }

        self.v &= !0x7000;
        let mut y = (self.v & 0x03E0) >> 5;
        if y == 29 {
            y = 0;
            self.v ^= 0x0800;
        } else if y == 31 {
            // Coarse Y in the attribute rows wraps without a nametable switch.
            y = 0;
        } else {
            y += 1;
        }

        self.v = (self.v & !0x03E0) | (y << 5);
    }

    pub fn copy_horizontal_bits(&mut self) {
        self.v = (self.v & !0x041F) | (self.t & 0x041F);
    }

    pub fn copy_vertical_bits(&mut self) {
        self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
    }

    pub fn tile_addr(&self) -> u16 {
        0x2000 | (self.v & 0x0FFF)
    }

    pub fn attribute_addr(&self) -> u16 {
        0x23C0 | (self.v & 0x0C00) | ((self.v >> 4) & 0x0038) | ((self.v >> 2) & 0x0007)
    }

    /// Shift selecting this tile's quadrant within an attribute byte.
    pub fn attribute_shift(&self) -> u16 {
        ((self.v >> 4) & 0x04) | (self.v & 0x02)
    }

    pub fn fine_y(&self) -> u16 {
        (self.v >> 12) & 0x07
    }
}
