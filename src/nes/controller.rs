pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_UP: u8 = 0x10;
pub const BUTTON_DOWN: u8 = 0x20;
pub const BUTTON_LEFT: u8 = 0x40;
pub const BUTTON_RIGHT: u8 = 0x80;

/// Standard pad. Button bits are stored in serial order, A first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Controller {
    state: u8,
    shift: u8,
}

impl Controller {
    fn latch(&mut self) {
        self.shift = self.state;
    }

    fn read(&mut self, strobe: bool) -> u8 {
        if strobe {
            return self.state & 0x01;
        }
        let bit = self.shift & 0x01;
        // Ones shift in behind the eight buttons.
        self.shift = (self.shift >> 1) | 0x80;
        bit
    }
}

/// Both pads behind the shared $4016 strobe.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerPorts {
    pads: [Controller; 2],
    strobe: bool,
}

impl ControllerPorts {
    pub fn set_state(&mut self, port: usize, buttons: u8) {
        if let Some(pad) = self.pads.get_mut(port) {
            pad.state = buttons;
            if self.strobe {
                pad.latch();
            }
        }
    }

    pub fn state(&self, port: usize) -> u8 {
        self.pads.get(port).map_or(0, |pad| pad.state)
    }

    pub fn write_strobe(&mut self, value: u8) {
        self.strobe = value & 0x01 != 0;
        if self.strobe {
            for pad in &mut self.pads {
                pad.latch();
            }
        }
    }

    /// Serial read for $4016 (port 0) or $4017 (port 1). Bit 6 reflects the
    /// open bus left over from the opcode's high address byte.
    pub fn read(&mut self, port: usize) -> u8 {
        let strobe = self.strobe;
        let bit = self.pads.get_mut(port).map_or(0, |pad| pad.read(strobe));
        0x40 | bit
    }

    pub fn peek(&self, port: usize) -> u8 {
        let bit = self.pads.get(port).map_or(0, |pad| {
            if self.strobe {
                pad.state & 0x01
            } else {
                pad.shift & 0x01
            }
        });
        0x40 | bit
    }
}
