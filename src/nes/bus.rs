use super::apu::{APU_FRAME_COUNTER, APU_STATUS, Apu, ApuPort};
use super::controller::ControllerPorts;
use super::mapper::Mapper;
use super::ppu::Ppu;

pub const RAM_SIZE: usize = 0x0800;
pub const OAM_DMA: u16 = 0x4014;

/// Register traffic from the CPU to the PPU. `index` is the register number
/// 0-7 after mirroring.
pub trait PpuPort {
    fn read_register(&mut self, index: u8) -> u8;
    fn write_register(&mut self, index: u8, value: u8);
    fn peek_register(&self, index: u8) -> u8;
}

/// Everything the CPU core can see.
pub trait CpuBus {
    fn read(&mut self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    /// Side-effect free read for tracing and debuggers.
    fn peek(&self, addr: u16) -> u8;
    /// Page latched by a $4014 write since the last call.
    fn take_dma_request(&mut self) -> Option<u8>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BusCounters {
    pub cpu_reads: u64,
    pub cpu_writes: u64,
    pub cpu_reads_ram: u64,
    pub cpu_reads_ppu_regs: u64,
    pub cpu_reads_apu_io: u64,
    pub cpu_reads_cart: u64,
    pub cpu_writes_ram: u64,
    pub cpu_writes_ppu_regs: u64,
    pub cpu_writes_apu_io: u64,
    pub cpu_writes_cart: u64,
    pub dma_requests: u64,
    pub last_cpu_read_addr: u16,
    pub last_cpu_write_addr: u16,
    pub last_cpu_write_value: u8,
}

/// CPU address decoder. Owns work RAM and the devices hanging off the CPU
/// bus.
pub struct Bus<P: PpuPort = Ppu> {
    ram: [u8; RAM_SIZE],
    ppu: P,
    apu: Box<dyn ApuPort>,
    mapper: Option<Box<dyn Mapper>>,
    controllers: ControllerPorts,
    open_bus: u8,
    dma_request: Option<u8>,
    counters: BusCounters,
}

impl<P: PpuPort> Bus<P> {
    pub fn new(ppu: P) -> Self {
        Self {
            ram: [0; RAM_SIZE],
            ppu,
            apu: Box::new(Apu::new()),
            mapper: None,
            controllers: ControllerPorts::default(),
            open_bus: 0,
            dma_request: None,
            counters: BusCounters::default(),
        }
    }

    pub fn with_apu(mut self, apu: Box<dyn ApuPort>) -> Self {
        self.apu = apu;
        self
    }

    pub fn ppu(&self) -> &P {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut P {
        &mut self.ppu
    }

    pub fn apu(&self) -> &dyn ApuPort {
        self.apu.as_ref()
    }

    pub fn set_mapper(&mut self, mapper: Box<dyn Mapper>) {
        self.mapper = Some(mapper);
    }

    pub fn mapper(&self) -> Option<&dyn Mapper> {
        self.mapper.as_deref()
    }

    pub fn controllers(&self) -> &ControllerPorts {
        &self.controllers
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerPorts {
        &mut self.controllers
    }

    pub fn ram(&self) -> &[u8; RAM_SIZE] {
        &self.ram
    }

    pub fn counters(&self) -> BusCounters {
        self.counters
    }

    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    pub fn clock_apu(&mut self) {
        self.apu.clock();
    }

    pub fn irq_line(&self) -> bool {
        self.apu.irq_pending()
    }

    /// Power-cycle the bus devices, keeping the cartridge.
    pub fn reset(&mut self) {
        self.ram = [0; RAM_SIZE];
        self.apu.reset();
        self.controllers = ControllerPorts::default();
        self.open_bus = 0;
        self.dma_request = None;
        self.counters = BusCounters::default();
    }
}

impl<P: PpuPort> CpuBus for Bus<P> {
    fn read(&mut self, addr: u16) -> u8 {
        self.counters.cpu_reads = self.counters.cpu_reads.wrapping_add(1);
        self.counters.last_cpu_read_addr = addr;

        let value = match addr {
            0x0000..=0x1FFF => {
                self.counters.cpu_reads_ram = self.counters.cpu_reads_ram.wrapping_add(1);
                self.ram[(addr & 0x07FF) as usize]
            }
            0x2000..=0x3FFF => {
                self.counters.cpu_reads_ppu_regs =
                    self.counters.cpu_reads_ppu_regs.wrapping_add(1);
                self.ppu.read_register((addr & 0x0007) as u8)
            }
            0x4000..=0x401F => {
                self.counters.cpu_reads_apu_io = self.counters.cpu_reads_apu_io.wrapping_add(1);
                match addr {
                    APU_STATUS => self.apu.read_status() | (self.open_bus & 0x20),
                    0x4016 => self.controllers.read(0),
                    0x4017 => self.controllers.read(1),
                    _ => self.open_bus,
                }
            }
            _ => {
                self.counters.cpu_reads_cart = self.counters.cpu_reads_cart.wrapping_add(1);
                self.mapper
                    .as_mut()
                    .and_then(|m| m.cpu_read(addr))
                    .unwrap_or(self.open_bus)
            }
        };

        self.open_bus = value;
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.counters.cpu_writes = self.counters.cpu_writes.wrapping_add(1);
        self.counters.last_cpu_write_addr = addr;
        self.counters.last_cpu_write_value = value;
        self.open_bus = value;

        match addr {
            0x0000..=0x1FFF => {
                self.counters.cpu_writes_ram = self.counters.cpu_writes_ram.wrapping_add(1);
                self.ram[(addr & 0x07FF) as usize] = value;
            }
            0x2000..=0x3FFF => {
                self.counters.cpu_writes_ppu_regs =
                    self.counters.cpu_writes_ppu_regs.wrapping_add(1);
                self.ppu.write_register((addr & 0x0007) as u8, value);
            }
            0x4000..=0x401F => {
                self.counters.cpu_writes_apu_io = self.counters.cpu_writes_apu_io.wrapping_add(1);
                match addr {
                    OAM_DMA => {
                        self.counters.dma_requests = self.counters.dma_requests.wrapping_add(1);
                        self.dma_request = Some(value);
                    }
                    0x4016 => self.controllers.write_strobe(value),
                    0x4000..=0x4013 | APU_STATUS | APU_FRAME_COUNTER => {
                        self.apu.write_register(addr, value)
                    }
                    _ => {}
                }
            }
            _ => {
                self.counters.cpu_writes_cart = self.counters.cpu_writes_cart.wrapping_add(1);
                if let Some(mapper) = self.mapper.as_mut() {
                    mapper.cpu_write(addr, value);
                }
            }
        }
    }

    fn peek(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => self.ppu.peek_register((addr & 0x0007) as u8),
            // APU/IO registers show as $FF in traces.
            0x4000..=0x401F => 0xFF,
            _ => self
                .mapper
                .as_ref()
                .and_then(|m| m.cpu_peek(addr))
                .unwrap_or(self.open_bus),
        }
    }

    fn take_dma_request(&mut self) -> Option<u8> {
        self.dma_request.take()
    }
}
