pub const FLAG_CARRY: u8 = 0x01;
pub const FLAG_ZERO: u8 = 0x02;
pub const FLAG_INTERRUPT: u8 = 0x04;
pub const FLAG_DECIMAL: u8 = 0x08;
pub const FLAG_BREAK: u8 = 0x10;
pub const FLAG_UNUSED: u8 = 0x20;
pub const FLAG_OVERFLOW: u8 = 0x40;
pub const FLAG_NEGATIVE: u8 = 0x80;

/// The six stored 6502 processor flags.
///
/// B and bit 5 have no storage: they only exist in the byte pushed to the
/// stack, where `pack` fills them in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusRegister {
    pub carry: bool,
    pub zero: bool,
    pub interrupt_disable: bool,
    pub decimal: bool,
    pub overflow: bool,
    pub negative: bool,
}

impl StatusRegister {
    pub fn pack(self, break_flag: bool) -> u8 {
        let mut p = FLAG_UNUSED;
        if self.carry {
            p |= FLAG_CARRY;
        }
        if self.zero {
            p |= FLAG_ZERO;
        }
        if self.interrupt_disable {
            p |= FLAG_INTERRUPT;
        }
        if self.decimal {
            p |= FLAG_DECIMAL;
        }
        if break_flag {
            p |= FLAG_BREAK;
        }
        if self.overflow {
            p |= FLAG_OVERFLOW;
        }
        if self.negative {
            p |= FLAG_NEGATIVE;
        }
        p
    }

    pub fn unpack(p: u8) -> Self {
        Self {
            carry: p & FLAG_CARRY != 0,
            zero: p & FLAG_ZERO != 0,
            interrupt_disable: p & FLAG_INTERRUPT != 0,
            decimal: p & FLAG_DECIMAL != 0,
            overflow: p & FLAG_OVERFLOW != 0,
            negative: p & FLAG_NEGATIVE != 0,
        }
    }

    /// The value the status register reads as outside of a push.
    pub fn bits(self) -> u8 {
        self.pack(false)
    }

    pub fn set_zn(&mut self, value: u8) {
        self.zero = value == 0;
        self.negative = value & 0x80 != 0;
    }
}
