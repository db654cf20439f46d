//! C3: loading the LDM config region and locating the TOCBLOCK and VMDB
//! header within it.

use deku::prelude::*;

use crate::boundary::{PrivHead, ReadAt};
use crate::error::{LdmError, Result};

/// Offset, in bytes, of TOCBLOCK within the config region (at 512-byte
/// sectors: `2 * 512`).
const TOCBLOCK_OFFSET: u64 = 0x400;

#[derive(Debug, DekuRead)]
#[deku(endian = "big")]
struct RawTocBitmap {
  name: [u8; 8],
  _flags1: u16,
  start: u64,
  _size: u64,
  _flags2: u64,
}

#[derive(Debug, DekuRead)]
#[deku(endian = "big", magic = b"TOCBLOCK")]
struct RawTocBlock {
  _seq1: u32,
  _padding1: [u8; 4],
  _seq2: u32,
  _padding2: [u8; 16],
  bitmap: [RawTocBitmap; 2],
}

impl RawTocBlock {
  const SIZE: usize = 8 + 4 + 4 + 4 + 16 + 2 * (8 + 2 + 8 + 8 + 8);
}

#[derive(Debug, DekuRead)]
#[deku(endian = "big", magic = b"VMDB")]
struct RawVmdb {
  _vblk_last: u32,
  vblk_size: u32,
  vblk_first_offset: u32,

  _update_status: u16,
  _version_major: u16,
  _version_minor: u16,

  _disk_group_name: [u8; 31],
  _disk_group_guid: [u8; 64],

  committed_seq: u64,
  _pending_seq: u64,
  n_committed_vblks_vol: u32,
  n_committed_vblks_comp: u32,
  n_committed_vblks_part: u32,
  n_committed_vblks_disk: u32,
}

impl RawVmdb {
  const SIZE: usize = 4 + 4 + 4 + 4 + 2 + 2 + 2 + 31 + 64 + 8 + 8 + 4 + 4 + 4 + 4;
}

/// The VMDB fields the rest of the parser needs.
#[derive(Debug, Clone)]
pub struct Vmdb {
  pub vblk_size: u32,
  pub vblk_first_offset: u32,
  pub committed_seq: u64,
  pub n_committed_vblks_vol: u32,
  pub n_committed_vblks_comp: u32,
  pub n_committed_vblks_part: u32,
  pub n_committed_vblks_disk: u32,
  /// Absolute offset, in bytes from the start of the config region, of the
  /// VMDB header.
  pub offset: u64,
}

/// The loaded LDM config region and its decoded VMDB header.
pub struct LdmConfig {
  pub region: Vec<u8>,
  pub vmdb: Vmdb,
}

/// Read the whole LDM configuration region into memory, then locate
/// TOCBLOCK and, through it, VMDB.
pub fn load_config<R: ReadAt>(reader: &mut R, path: &str, privhead: &PrivHead, sector_size: u64) -> Result<LdmConfig> {
  let region_start = privhead.ldm_config_start * sector_size;
  let region_len = privhead.ldm_config_size * sector_size;

  if let Ok(device_size) = reader.size() {
    if region_start + region_len > device_size {
      return Err(LdmError::invalid(
        path,
        format!(
          "LDM config region [{}, {}) extends past end of device ({} bytes)",
          region_start,
          region_start + region_len,
          device_size
        ),
      ));
    }
  }

  let mut region = vec![0u8; region_len as usize];
  reader
    .read_at(region_start, &mut region)
    .map_err(|e| LdmError::io(path, e))?;

  let toc_buf = region
    .get(TOCBLOCK_OFFSET as usize..TOCBLOCK_OFFSET as usize + RawTocBlock::SIZE)
    .ok_or_else(|| LdmError::invalid(path, "config region too small to contain TOCBLOCK"))?;
  let (_, toc) = RawTocBlock::from_bytes((toc_buf, 0))
    .map_err(|_| LdmError::invalid(path, format!("didn't find TOCBLOCK at config offset {:#x}", TOCBLOCK_OFFSET)))?;

  let config_bitmap = toc
    .bitmap
    .iter()
    .find(|b| {
      let name: Vec<u8> = b.name.iter().take_while(|&&c| c != 0).cloned().collect();
      name == b"config"
    })
    .ok_or_else(|| LdmError::invalid(path, "TOCBLOCK doesn't contain config bitmap"))?;

  let vmdb_offset = config_bitmap.start * sector_size;
  let vmdb_buf = region
    .get(vmdb_offset as usize..vmdb_offset as usize + RawVmdb::SIZE)
    .ok_or_else(|| LdmError::invalid(path, "config region too small to contain VMDB"))?;
  let (_, raw_vmdb) = RawVmdb::from_bytes((vmdb_buf, 0))
    .map_err(|_| LdmError::invalid(path, format!("didn't find VMDB at config offset {:#x}", vmdb_offset)))?;

  let vmdb = Vmdb {
    vblk_size: raw_vmdb.vblk_size,
    vblk_first_offset: raw_vmdb.vblk_first_offset,
    committed_seq: raw_vmdb.committed_seq,
    n_committed_vblks_vol: raw_vmdb.n_committed_vblks_vol,
    n_committed_vblks_comp: raw_vmdb.n_committed_vblks_comp,
    n_committed_vblks_part: raw_vmdb.n_committed_vblks_part,
    n_committed_vblks_disk: raw_vmdb.n_committed_vblks_disk,
    offset: vmdb_offset,
  };

  Ok(LdmConfig { region, vmdb })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::boundary::PrivHead;
  use std::io::Cursor as IoCursor;
  use uuid::Uuid;

  fn fake_privhead(config_start: u64, config_size: u64) -> PrivHead {
    PrivHead {
      version_major: 2,
      version_minor: 1,
      disk_guid: Uuid::nil(),
      disk_group_guid: Uuid::nil(),
      disk_group_name: "DG1".to_string(),
      logical_disk_start: 0,
      logical_disk_size: 0,
      ldm_config_start: config_start,
      ldm_config_size: config_size,
      disk_signature: 0,
    }
  }

  fn build_region(vmdb_sector: u64) -> Vec<u8> {
    let mut region = vec![0u8; 64 * 512];
    region[TOCBLOCK_OFFSET as usize..TOCBLOCK_OFFSET as usize + 8].copy_from_slice(b"TOCBLOCK");
    let bitmap0_off = TOCBLOCK_OFFSET as usize + 8 + 4 + 4 + 4 + 16;
    region[bitmap0_off..bitmap0_off + 8].copy_from_slice(b"config\0\0");
    let start_off = bitmap0_off + 8 + 2;
    region[start_off..start_off + 8].copy_from_slice(&vmdb_sector.to_be_bytes());

    let vmdb_off = (vmdb_sector * 512) as usize;
    region[vmdb_off..vmdb_off + 4].copy_from_slice(b"VMDB");
    region[vmdb_off + 4..vmdb_off + 8].copy_from_slice(&0u32.to_be_bytes());
    region[vmdb_off + 8..vmdb_off + 12].copy_from_slice(&128u32.to_be_bytes());
    region[vmdb_off + 12..vmdb_off + 16].copy_from_slice(&16u32.to_be_bytes());
    let committed_seq_off = vmdb_off + 4 + 4 + 4 + 4 + 2 + 2 + 2 + 31 + 64;
    region[committed_seq_off..committed_seq_off + 8].copy_from_slice(&7u64.to_be_bytes());
    region
  }

  #[test]
  fn loads_vmdb_through_tocblock() {
    let region = build_region(4);
    let privhead = fake_privhead(0, (region.len() / 512) as u64);
    let mut reader = IoCursor::new(region);
    let cfg = load_config(&mut reader, "test", &privhead, 512).unwrap();
    assert_eq!(cfg.vmdb.vblk_size, 128);
    assert_eq!(cfg.vmdb.vblk_first_offset, 16);
    assert_eq!(cfg.vmdb.committed_seq, 7);
  }

  #[test]
  fn region_past_device_end_is_invalid() {
    let privhead = fake_privhead(0, 1_000_000);
    let mut reader = IoCursor::new(vec![0u8; 512]);
    assert!(matches!(
      load_config(&mut reader, "test", &privhead, 512),
      Err(LdmError::Invalid { .. })
    ));
  }
}
