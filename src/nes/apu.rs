//! Audio unit seam. Channel synthesis lives outside the core; the bundled
//! `Apu` only runs the frame sequencer so the frame IRQ reaches the CPU.

const FC_4STEP_IRQ: u32 = 29_829;
const FC_4STEP_RESET: u32 = 29_830;
const FC_5STEP_RESET: u32 = 37_282;

pub const APU_STATUS: u16 = 0x4015;
pub const APU_FRAME_COUNTER: u16 = 0x4017;

/// What the CPU bus needs from an audio unit.
pub trait ApuPort {
    /// $4000-$4013, $4015 and $4017.
    fn write_register(&mut self, addr: u16, value: u8);
    /// $4015 read. Acknowledges the frame IRQ.
    fn read_status(&mut self) -> u8;
    /// Side-effect free $4015 view.
    fn peek_status(&self) -> u8;
    /// Once per CPU cycle.
    fn clock(&mut self);
    fn irq_pending(&self) -> bool;
    fn reset(&mut self);
}

/// Last-written register file plus the frame sequencer.
pub struct Apu {
    registers: [u8; 0x18],
    sequencer: FrameSequencer,
    cpu_cycle: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct FrameSequencer {
    step: u32,
    five_step: bool,
    irq_inhibit: bool,
    irq_flag: bool,
    // ($4017 value, cycles until it applies)
    pending_write: Option<(u8, u8)>,
}

impl FrameSequencer {
    fn schedule_write(&mut self, value: u8, odd_cycle: bool) {
        if value & 0x40 != 0 {
            self.irq_flag = false;
        }
        // Takes effect 3 or 4 cycles later depending on write parity.
        self.pending_write = Some((value, if odd_cycle { 4 } else { 3 }));
    }

    fn tick(&mut self) {
        if let Some((value, delay)) = self.pending_write {
            if delay <= 1 {
                self.pending_write = None;
                self.five_step = value & 0x80 != 0;
                self.irq_inhibit = value & 0x40 != 0;
                self.irq_flag &= !self.irq_inhibit;
                self.step = 0;
            } else {
                self.pending_write = Some((value, delay - 1));
            }
        }

        self.step += 1;
        let period = if self.five_step {
            FC_5STEP_RESET
        } else {
            FC_4STEP_RESET
        };
        if !self.five_step && self.step >= FC_4STEP_IRQ && !self.irq_inhibit {
            self.irq_flag = true;
        }
        if self.step >= period {
            self.step = 0;
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl Apu {
    pub fn new() -> Self {
        Self {
            registers: [0; 0x18],
            sequencer: FrameSequencer::default(),
            cpu_cycle: 0,
        }
    }

    /// Last value written to `addr` in $4000-$4017.
    pub fn register(&self, addr: u16) -> u8 {
        self.registers
            .get(addr.wrapping_sub(0x4000) as usize)
            .copied()
            .unwrap_or(0)
    }
}

impl ApuPort for Apu {
    fn write_register(&mut self, addr: u16, value: u8) {
        if let Some(slot) = self.registers.get_mut(addr.wrapping_sub(0x4000) as usize) {
            *slot = value;
        }
        if addr == APU_FRAME_COUNTER {
            self.sequencer.schedule_write(value, self.cpu_cycle & 1 == 1);
        }
    }

    fn read_status(&mut self) -> u8 {
        let status = self.peek_status();
        self.sequencer.irq_flag = false;
        status
    }

    fn peek_status(&self) -> u8 {
        if self.sequencer.irq_flag { 0x40 } else { 0 }
    }

    fn clock(&mut self) {
        self.cpu_cycle = self.cpu_cycle.wrapping_add(1);
        self.sequencer.tick();
    }

    fn irq_pending(&self) -> bool {
        self.sequencer.irq_flag
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(apu: &mut Apu, cycles: u32) {
        for _ in 0..cycles {
            apu.clock();
        }
    }

    #[test]
    fn four_step_mode_raises_frame_irq() {
        let mut apu = Apu::new();
        run(&mut apu, FC_4STEP_IRQ - 1);
        assert!(!apu.irq_pending());
        run(&mut apu, 1);
        assert!(apu.irq_pending());
    }

    #[test]
    fn status_read_acknowledges_frame_irq() {
        let mut apu = Apu::new();
        run(&mut apu, FC_4STEP_IRQ);
        assert_eq!(apu.peek_status(), 0x40);
        assert_eq!(apu.read_status(), 0x40);
        assert!(!apu.irq_pending());
        assert_eq!(apu.read_status(), 0x00);
    }

    #[test]
    fn inhibit_bit_suppresses_and_clears_irq() {
        let mut apu = Apu::new();
        run(&mut apu, FC_4STEP_IRQ);
        apu.write_register(APU_FRAME_COUNTER, 0x40);
        assert!(!apu.irq_pending());
        run(&mut apu, FC_4STEP_RESET * 2);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn five_step_mode_never_raises_irq() {
        let mut apu = Apu::new();
        apu.write_register(APU_FRAME_COUNTER, 0x80);
        run(&mut apu, FC_5STEP_RESET * 2);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn channel_registers_are_latched() {
        let mut apu = Apu::new();
        apu.write_register(0x4003, 0xF8);
        assert_eq!(apu.register(0x4003), 0xF8);
        assert_eq!(apu.register(0x5000), 0);
    }
}
