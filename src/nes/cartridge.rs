use anyhow::{Context, Result, bail};
use std::{fs, path::Path};

use super::mapper::Mirroring;

pub const HEADER_LEN: usize = 16;
pub const TRAINER_LEN: usize = 512;
pub const PRG_BANK_LEN: usize = 16 * 1024;
pub const CHR_BANK_LEN: usize = 8 * 1024;

/// Raw cartridge image split out of an iNES / NES 2.0 file.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub mapper_id: u16,
    pub submapper_id: u8,
    pub mirroring: Mirroring,
    pub has_trainer: bool,
    pub has_battery_backed_ram: bool,
    pub is_nes2: bool,
    pub prg_rom: Vec<u8>,
    pub chr_data: Vec<u8>,
    pub chr_is_ram: bool,
    pub prg_ram_size: usize,
}

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read ROM: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("failed to parse ROM: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            bail!("ROM is too small to contain an iNES header");
        }
        if &bytes[0..4] != b"NES\x1A" {
            bail!("invalid iNES header magic, expected NES<EOF>");
        }

        let flags6 = bytes[6];
        let flags7 = bytes[7];
        let is_nes2 = (flags7 & 0x0C) == 0x08;

        let mapper_id_low = ((flags6 as u16) >> 4) | ((flags7 as u16) & 0xF0);
        let mapper_id = if is_nes2 {
            mapper_id_low | (((bytes[8] as u16) & 0x0F) << 8)
        } else {
            mapper_id_low
        };
        let submapper_id = if is_nes2 { bytes[8] >> 4 } else { 0 };
        let mirroring = if (flags6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let has_trainer = (flags6 & 0x04) != 0;
        let has_battery_backed_ram = (flags6 & 0x02) != 0;

        let (prg_rom_size, chr_rom_size, prg_ram_size) = if is_nes2 {
            let prg_msb = (bytes[9] & 0x0F) as usize;
            let chr_msb = (bytes[9] >> 4) as usize;
            if prg_msb == 0x0F || chr_msb == 0x0F {
                bail!("NES 2.0 exponent/multiplier ROM size encoding is not supported");
            }

            let prg_units = (prg_msb << 8) | bytes[4] as usize;
            let chr_units = (chr_msb << 8) | bytes[5] as usize;

            let prg_shift = bytes[10] & 0x0F;
            let prg_ram = if prg_shift == 0 {
                8 * 1024
            } else {
                64usize << prg_shift
            };

            (prg_units * PRG_BANK_LEN, chr_units * CHR_BANK_LEN, prg_ram)
        } else {
            let prg_ram_units = if bytes[8] == 0 { 1 } else { bytes[8] as usize };
            (
                bytes[4] as usize * PRG_BANK_LEN,
                bytes[5] as usize * CHR_BANK_LEN,
                prg_ram_units * 8 * 1024,
            )
        };

        if prg_rom_size == 0 {
            bail!("invalid PRG ROM: header declares zero banks");
        }

        let mut cursor = HEADER_LEN;
        if has_trainer {
            cursor += TRAINER_LEN;
        }

        if bytes.len() < cursor + prg_rom_size {
            bail!(
                "ROM truncated: expected {} PRG bytes but file ended early",
                prg_rom_size
            );
        }

        let prg_rom_end = cursor + prg_rom_size;
        let prg_rom = bytes[cursor..prg_rom_end].to_vec();
        cursor = prg_rom_end;

        let (chr_data, chr_is_ram) = if chr_rom_size == 0 {
            (vec![0; CHR_BANK_LEN], true)
        } else {
            if bytes.len() < cursor + chr_rom_size {
                bail!(
                    "ROM truncated: expected {} CHR bytes but file ended early",
                    chr_rom_size
                );
            }
            (bytes[cursor..cursor + chr_rom_size].to_vec(), false)
        };

        Ok(Self {
            mapper_id,
            submapper_id,
            mirroring,
            has_trainer,
            has_battery_backed_ram,
            is_nes2,
            prg_rom,
            chr_data,
            chr_is_ram,
            prg_ram_size,
        })
    }
}

/// Builds an iNES 1.0 image in memory. Shared by tests across the crate.
#[cfg(test)]
pub(crate) fn build_ines(prg: &[u8], chr: &[u8], flags6: u8) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_LEN];
    bytes[0..4].copy_from_slice(b"NES\x1A");
    bytes[4] = (prg.len() / PRG_BANK_LEN) as u8;
    bytes[5] = (chr.len() / CHR_BANK_LEN) as u8;
    bytes[6] = flags6;
    bytes.extend_from_slice(prg);
    bytes.extend_from_slice(chr);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nrom_header_fields() {
        let prg = vec![0xEA; PRG_BANK_LEN];
        let chr = vec![0x11; CHR_BANK_LEN];
        let cart = Cartridge::from_bytes(&build_ines(&prg, &chr, 0x01)).unwrap();

        assert_eq!(cart.mapper_id, 0);
        assert_eq!(cart.mirroring, Mirroring::Vertical);
        assert_eq!(cart.prg_rom.len(), PRG_BANK_LEN);
        assert_eq!(cart.chr_data[0], 0x11);
        assert!(!cart.chr_is_ram);
        assert!(!cart.has_trainer);
        assert!(!cart.is_nes2);
    }

    #[test]
    fn zero_chr_banks_allocate_chr_ram() {
        let prg = vec![0; PRG_BANK_LEN];
        let cart = Cartridge::from_bytes(&build_ines(&prg, &[], 0x00)).unwrap();

        assert!(cart.chr_is_ram);
        assert_eq!(cart.chr_data.len(), CHR_BANK_LEN);
        assert_eq!(cart.mirroring, Mirroring::Horizontal);
    }

    #[test]
    fn trainer_is_skipped() {
        let mut bytes = build_ines(&[], &[], 0x04);
        bytes[4] = 1;
        bytes.extend(std::iter::repeat_n(0xFF, TRAINER_LEN));
        let mut prg = vec![0u8; PRG_BANK_LEN];
        prg[0] = 0x42;
        bytes.extend_from_slice(&prg);

        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert!(cart.has_trainer);
        assert_eq!(cart.prg_rom[0], 0x42);
    }

    #[test]
    fn four_screen_flag_overrides_mirroring_bit() {
        let prg = vec![0; PRG_BANK_LEN];
        let cart = Cartridge::from_bytes(&build_ines(&prg, &[], 0x09)).unwrap();
        assert_eq!(cart.mirroring, Mirroring::FourScreen);
    }

    #[test]
    fn mapper_id_combines_both_nibbles() {
        let prg = vec![0; PRG_BANK_LEN];
        let mut bytes = build_ines(&prg, &[], 0x10);
        bytes[7] = 0x40;
        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert_eq!(cart.mapper_id, 0x41);
    }

    #[test]
    fn nes2_reads_extended_mapper_bits() {
        let prg = vec![0; PRG_BANK_LEN];
        let mut bytes = build_ines(&prg, &[], 0x00);
        bytes[7] = 0x08;
        bytes[8] = 0x31;
        let cart = Cartridge::from_bytes(&bytes).unwrap();
        assert!(cart.is_nes2);
        assert_eq!(cart.mapper_id, 0x100);
        assert_eq!(cart.submapper_id, 3);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build_ines(&vec![0; PRG_BANK_LEN], &[], 0);
        bytes[3] = 0x00;
        let err = Cartridge::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn rejects_short_header() {
        assert!(Cartridge::from_bytes(b"NES\x1A").is_err());
    }

    #[test]
    fn rejects_truncated_prg() {
        let mut bytes = build_ines(&vec![0; PRG_BANK_LEN], &[], 0);
        bytes.truncate(HEADER_LEN + 100);
        let err = Cartridge::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("PRG"));
    }

    #[test]
    fn rejects_truncated_chr() {
        let mut bytes = build_ines(&vec![0; PRG_BANK_LEN], &vec![0; CHR_BANK_LEN], 0);
        bytes.truncate(bytes.len() - 1);
        let err = Cartridge::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("CHR"));
    }

    #[test]
    fn rejects_zero_prg_banks() {
        let bytes = build_ines(&[], &[], 0);
        assert!(Cartridge::from_bytes(&bytes).is_err());
    }
}
