use anyhow::{Result, bail};

use super::cartridge::{CHR_BANK_LEN, Cartridge, PRG_BANK_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    OneScreenLower,
    OneScreenUpper,
    FourScreen,
}

impl Mirroring {
    /// Physical nametable slot (0..4) backing logical nametable `table`.
    pub fn nametable_slot(self, table: u16) -> u16 {
        let table = table & 0x03;
        match self {
            Mirroring::Horizontal => table >> 1,
            Mirroring::Vertical => table & 0x01,
            Mirroring::OneScreenLower => 0,
            Mirroring::OneScreenUpper => 1,
            Mirroring::FourScreen => table,
        }
    }
}

/// CPU-side view of a cartridge board.
///
/// CHR lives in PPU memory; the mapper only owns PRG space and reports the
/// nametable arrangement it wires up.
pub trait Mapper {
    /// `None` means nothing drives the data bus at `addr`.
    fn cpu_read(&mut self, addr: u16) -> Option<u8>;
    fn cpu_write(&mut self, addr: u16, value: u8);
    fn cpu_peek(&self, addr: u16) -> Option<u8>;
    fn mirroring(&self) -> Mirroring;
    fn name(&self) -> &'static str;
}

pub fn mapper_name(mapper_id: u16) -> &'static str {
    match mapper_id {
        0 => "NROM",
        1 => "MMC1",
        2 => "UxROM",
        3 => "CNROM",
        4 => "MMC3",
        7 => "AxROM",
        _ => "Unsupported",
    }
}

pub fn create_mapper(cart: &Cartridge) -> Result<Box<dyn Mapper>> {
    let mapper: Box<dyn Mapper> = match cart.mapper_id {
        0 => Box::new(Nrom::new(cart)?),
        id => {
            bail!(
                "mapper {id} ({}) is not supported; only NROM (mapper 0) is",
                mapper_name(id)
            );
        }
    };
    Ok(mapper)
}

struct Nrom {
    prg_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    mirroring: Mirroring,
}

impl Nrom {
    fn new(cart: &Cartridge) -> Result<Self> {
        let prg_len = cart.prg_rom.len();
        if prg_len != PRG_BANK_LEN && prg_len != 2 * PRG_BANK_LEN {
            bail!("NROM expects 16 KiB or 32 KiB of PRG ROM, found {prg_len} bytes");
        }
        if cart.chr_data.len() > CHR_BANK_LEN {
            bail!(
                "NROM supports at most 8 KiB of CHR, found {} bytes",
                cart.chr_data.len()
            );
        }
        Ok(Self {
            prg_rom: cart.prg_rom.clone(),
            prg_ram: vec![0; cart.prg_ram_size.max(8 * 1024)],
            mirroring: cart.mirroring,
        })
    }

    fn read(&self, addr: u16) -> Option<u8> {
        match addr {
            0x6000..=0x7FFF => {
                let idx = (addr as usize - 0x6000) % self.prg_ram.len();
                Some(self.prg_ram[idx])
            }
            // A 16 KiB image shows up again at $C000.
            0x8000..=0xFFFF => Some(self.prg_rom[(addr as usize - 0x8000) % self.prg_rom.len()]),
            _ => None,
        }
    }
}

impl Mapper for Nrom {
    fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        self.read(addr)
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        if (0x6000..=0x7FFF).contains(&addr) {
            let idx = (addr as usize - 0x6000) % self.prg_ram.len();
            self.prg_ram[idx] = value;
        }
    }

    fn cpu_peek(&self, addr: u16) -> Option<u8> {
        self.read(addr)
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn name(&self) -> &'static str {
        "NROM"
    }
}
