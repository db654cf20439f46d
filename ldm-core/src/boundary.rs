//! C2: locating the PRIVHEAD on MBR-partitioned and GPT-partitioned disks.
//!
//! The MBR/GPT lookups here are intentionally narrow: they implement only
//! the one question LDM needs answered ("where does PRIVHEAD live"), not a
//! general-purpose partition table reader.

use deku::prelude::*;
use uuid::Uuid;

use crate::error::{LdmError, Result};

const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const MBR_PART_WINDOWS_LDM: u8 = 0x42;
const MBR_PART_EFI_PROTECTIVE: u8 = 0xEE;

/// GPT partition type GUID for an LDM metadata partition:
/// `5808C8AA-7E8F-42E0-85D2-E1E90434CFB3`.
const LDM_METADATA_TYPE_GUID: [u8; 16] = [
  0x58, 0x08, 0xC8, 0xAA, 0x7E, 0x8F, 0x42, 0xE0, 0x85, 0xD2, 0xE1, 0xE9, 0x04, 0x34, 0xCF, 0xB3,
];

pub trait ReadAt {
  /// Read exactly `buf.len()` bytes starting at absolute byte offset
  /// `offset`.
  fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()>;

  /// Total size of the device in bytes, if known.
  fn size(&mut self) -> std::io::Result<u64>;
}

impl<T: std::io::Read + std::io::Seek> ReadAt for T {
  fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    self.seek(std::io::SeekFrom::Start(offset))?;
    self.read_exact(buf)
  }

  fn size(&mut self) -> std::io::Result<u64> {
    self.seek(std::io::SeekFrom::End(0))
  }
}

#[derive(Debug, DekuRead)]
#[deku(endian = "big")]
struct RawPrivHead {
  magic: [u8; 8],

  _sequence: u32,
  version_major: u16,
  version_minor: u16,

  _timestamp: u64,
  _unknown_number: u64,
  _unknown_size1: u64,
  _unknown_size2: u64,

  disk_guid: [u8; 64],
  _host_guid: [u8; 64],
  disk_group_guid: [u8; 64],
  disk_group_name: [u8; 32],

  _unknown1: u16,
  _padding1: [u8; 9],

  logical_disk_start: u64,
  logical_disk_size: u64,
  ldm_config_start: u64,
  ldm_config_size: u64,
  _n_tocs: u64,
  _toc_size: u64,
  _n_configs: u32,
  _n_logs: u32,
  _config_size: u64,
  _log_size: u64,

  disk_signature: u32,
}

impl RawPrivHead {
  // magic(8) + sequence(4) + ver_major(2) + ver_minor(2) + 4 timestamps/sizes(8 each)
  // + 3 GUID fields(64 each) + name(32) + unknown1(2) + padding1(9)
  // + 6 u64 fields + 2 u32 fields + 2 u64 fields + disk_signature(4)
  const SIZE: usize = 359;
}

/// The fields of a disk's PRIVHEAD that downstream components need.
#[derive(Debug, Clone)]
pub struct PrivHead {
  pub version_major: u16,
  pub version_minor: u16,
  pub disk_guid: Uuid,
  pub disk_group_guid: Uuid,
  pub disk_group_name: String,
  pub logical_disk_start: u64,
  pub logical_disk_size: u64,
  pub ldm_config_start: u64,
  pub ldm_config_size: u64,
  pub disk_signature: u32,
}

fn ascii_guid_field(field: &[u8], what: &str, path: &str) -> Result<Uuid> {
  let text = field
    .iter()
    .take_while(|&&b| b != 0)
    .cloned()
    .collect::<Vec<u8>>();
  let text = std::str::from_utf8(&text)
    .map_err(|_| LdmError::invalid(path, format!("PRIVHEAD {} is not valid UTF-8", what)))?;
  Uuid::parse_str(text)
    .map_err(|e| LdmError::invalid(path, format!("PRIVHEAD contains invalid GUID for {}: {}", what, e)))
}

fn parse_privhead_at<R: ReadAt>(reader: &mut R, path: &str, offset: u64) -> Result<PrivHead> {
  let mut buf = vec![0u8; RawPrivHead::SIZE];
  reader
    .read_at(offset, &mut buf)
    .map_err(|e| LdmError::io(path, e))?;

  let (_, raw) = RawPrivHead::from_bytes((&buf, 0))
    .map_err(|e| LdmError::invalid(path, format!("failed to decode PRIVHEAD: {}", e)))?;

  if &raw.magic != b"PRIVHEAD" {
    return Err(LdmError::invalid(
      path,
      format!("PRIVHEAD magic not found at offset {:#x}", offset),
    ));
  }

  let disk_group_name = raw
    .disk_group_name
    .iter()
    .take_while(|&&b| b != 0)
    .map(|&b| b as char)
    .collect();

  Ok(PrivHead {
    version_major: raw.version_major,
    version_minor: raw.version_minor,
    disk_guid: ascii_guid_field(&raw.disk_guid, "disk", path)?,
    disk_group_guid: ascii_guid_field(&raw.disk_group_guid, "disk group", path)?,
    disk_group_name,
    logical_disk_start: raw.logical_disk_start,
    logical_disk_size: raw.logical_disk_size,
    ldm_config_start: raw.ldm_config_start,
    ldm_config_size: raw.ldm_config_size,
    disk_signature: raw.disk_signature,
  })
}

/// GPT header, read from LBA 1. Only the fields needed to locate and walk
/// the partition-entry array.
#[derive(Debug, DekuRead)]
#[deku(endian = "little", magic = b"EFI PART")]
struct RawGptHeader {
  _revision: u32,
  _header_size: u32,
  _header_crc32: u32,
  _reserved: u32,
  _current_lba: u64,
  _backup_lba: u64,
  _first_usable_lba: u64,
  _last_usable_lba: u64,
  _disk_guid: [u8; 16],
  partition_entry_lba: u64,
  num_partition_entries: u32,
  partition_entry_size: u32,
}

/// One GPT partition-table entry, enough to test its type GUID and read its
/// last LBA.
#[derive(Debug, DekuRead)]
#[deku(endian = "little")]
struct RawGptPartitionEntry {
  type_guid: [u8; 16],
  _unique_guid: [u8; 16],
  _first_lba: u64,
  last_lba: u64,
  _attributes: u64,
  _name: [u16; 36],
}

fn gpt_mixed_endian_type_guid(wire: &[u8; 16]) -> [u8; 16] {
  // The GPT spec stores GUIDs with the first three fields little-endian and
  // the last two big-endian ("mixed-endian"). `LDM_METADATA_TYPE_GUID` is
  // written above in the big-endian/RFC-4122 byte order the spec quotes it
  // in, so we byte-swap the on-disk entry into that order before comparing.
  [
    wire[3], wire[2], wire[1], wire[0], wire[5], wire[4], wire[7], wire[6], wire[8], wire[9],
    wire[10], wire[11], wire[12], wire[13], wire[14], wire[15],
  ]
}

fn find_gpt_ldm_privhead<R: ReadAt>(reader: &mut R, path: &str, sector_size: u64) -> Result<PrivHead> {
  let mut hdr_buf = vec![0u8; 92];
  reader
    .read_at(sector_size, &mut hdr_buf)
    .map_err(|e| LdmError::io(path, e))?;
  let (_, header) = RawGptHeader::from_bytes((&hdr_buf, 0))
    .map_err(|_| LdmError::not_ldm(path))?;

  let entry_size = header.partition_entry_size as u64;
  let base = header.partition_entry_lba * sector_size;

  for i in 0..header.num_partition_entries as u64 {
    let mut entry_buf = vec![0u8; entry_size as usize];
    reader
      .read_at(base + i * entry_size, &mut entry_buf)
      .map_err(|e| LdmError::io(path, e))?;
    let (_, entry) = RawGptPartitionEntry::from_bytes((&entry_buf, 0))
      .map_err(|e| LdmError::invalid(path, format!("malformed GPT partition entry {}: {}", i, e)))?;

    if gpt_mixed_endian_type_guid(&entry.type_guid) == LDM_METADATA_TYPE_GUID {
      // PRIVHEAD is in the last LBA of the LDM metadata partition.
      return parse_privhead_at(reader, path, entry.last_lba * sector_size);
    }
  }

  Err(LdmError::not_ldm(path))
}

impl LdmError {
  fn not_ldm(path: &str) -> Self {
    LdmError::NotLdm {
      path: path.to_string(),
    }
  }
}

/// Locate and decode PRIVHEAD from an open device, given the device's
/// sector size. Handles both MBR-LDM and protective-MBR/GPT layouts.
pub fn locate_privhead<R: ReadAt>(reader: &mut R, path: &str, sector_size: u64) -> Result<PrivHead> {
  let mut sector0 = vec![0u8; sector_size as usize];
  reader
    .read_at(0, &mut sector0)
    .map_err(|e| LdmError::io(path, e))?;

  if sector0.len() < 512 || sector0[510..512] != MBR_SIGNATURE {
    return Err(LdmError::not_ldm(path));
  }

  // First partition-table entry: offset 0x1BE, type byte at +4.
  let first_entry_type = sector0[0x1BE + 4];

  match first_entry_type {
    MBR_PART_WINDOWS_LDM => parse_privhead_at(reader, path, sector_size * 6),
    MBR_PART_EFI_PROTECTIVE => find_gpt_ldm_privhead(reader, path, sector_size),
    _ => Err(LdmError::not_ldm(path)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor as IoCursor;

  fn privhead_bytes(disk_guid: &str, dg_guid: &str, dg_name: &str) -> Vec<u8> {
    let mut buf = vec![0u8; RawPrivHead::SIZE];
    buf[0..8].copy_from_slice(b"PRIVHEAD");
    // version_major/minor
    buf[12..14].copy_from_slice(&2u16.to_be_bytes());
    buf[14..16].copy_from_slice(&1u16.to_be_bytes());
    let disk_guid_off = 8 + 4 + 2 + 2 + 8 * 4;
    buf[disk_guid_off..disk_guid_off + disk_guid.len()].copy_from_slice(disk_guid.as_bytes());
    let dg_guid_off = disk_guid_off + 64 + 64;
    buf[dg_guid_off..dg_guid_off + dg_guid.len()].copy_from_slice(dg_guid.as_bytes());
    let dg_name_off = dg_guid_off + 64;
    buf[dg_name_off..dg_name_off + dg_name.len()].copy_from_slice(dg_name.as_bytes());
    let tail_off = dg_name_off + 32 + 2 + 9;
    // logical_disk_start, logical_disk_size, ldm_config_start, ldm_config_size
    buf[tail_off..tail_off + 8].copy_from_slice(&2048u64.to_be_bytes());
    buf[tail_off + 8..tail_off + 16].copy_from_slice(&1000u64.to_be_bytes());
    buf[tail_off + 16..tail_off + 24].copy_from_slice(&3u64.to_be_bytes());
    buf[tail_off + 24..tail_off + 32].copy_from_slice(&3u64.to_be_bytes());
    buf
  }

  #[test]
  fn mbr_ldm_locates_privhead_at_sector_6() {
    let disk_guid = "11111111-1111-1111-1111-111111111111";
    let dg_guid = "22222222-2222-2222-2222-222222222222";
    let mut disk = vec![0u8; 512 * 7 + RawPrivHead::SIZE];
    disk[510] = 0x55;
    disk[511] = 0xAA;
    disk[0x1BE + 4] = MBR_PART_WINDOWS_LDM;
    let ph = privhead_bytes(disk_guid, dg_guid, "DG1");
    disk[512 * 6..512 * 6 + ph.len()].copy_from_slice(&ph);

    let mut reader = IoCursor::new(disk);
    let privhead = locate_privhead(&mut reader, "test", 512).unwrap();
    assert_eq!(privhead.disk_guid.to_string(), disk_guid);
    assert_eq!(privhead.disk_group_guid.to_string(), dg_guid);
    assert_eq!(privhead.disk_group_name, "DG1");
    assert_eq!(privhead.ldm_config_start, 3);
  }

  #[test]
  fn no_mbr_signature_is_not_ldm() {
    let disk = vec![0u8; 512 * 8];
    let mut reader = IoCursor::new(disk);
    assert!(matches!(
      locate_privhead(&mut reader, "test", 512),
      Err(LdmError::NotLdm { .. })
    ));
  }

  #[test]
  fn plain_mbr_without_ldm_type_is_not_ldm() {
    let mut disk = vec![0u8; 512 * 8];
    disk[510] = 0x55;
    disk[511] = 0xAA;
    disk[0x1BE + 4] = 0x83; // Linux native partition
    let mut reader = IoCursor::new(disk);
    assert!(matches!(
      locate_privhead(&mut reader, "test", 512),
      Err(LdmError::NotLdm { .. })
    ));
  }
}
