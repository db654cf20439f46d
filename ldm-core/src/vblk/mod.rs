//! C4 (VBLK decoder) and C5 (spanned-record assembler).
//!
//! The VBLK stream is a flat sequence of fixed-width entries; a logical
//! record may be split across several consecutive-in-id (not necessarily
//! consecutive-in-stream) entries. [`decode_vblk_stream`] reassembles
//! spanned records, then dispatches each complete record to the decoder
//! for its kind.

mod component;
mod disk;
mod disk_group;
mod partition;
mod volume;

pub use component::{ComponentKind, ComponentRecord};
pub use disk::DiskRecord;
pub use disk_group::DiskGroupRecord;
pub use partition::PartitionRecord;
pub use volume::{VolumeInternalKind, VolumeRecord};

use std::collections::HashMap;

use crate::error::{LdmError, Result};
use crate::reader::Cursor;

const VBLK_HEAD_SIZE: usize = 16;

struct VblkHead {
  record_id: u32,
  entry: u16,
  entries_total: u16,
}

fn read_vblk_head(buf: &[u8]) -> Option<VblkHead> {
  if buf.len() < VBLK_HEAD_SIZE || &buf[0..4] != b"VBLK" {
    return None;
  }
  Some(VblkHead {
    record_id: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
    entry: u16::from_be_bytes([buf[12], buf[13]]),
    entries_total: u16::from_be_bytes([buf[14], buf[15]]),
  })
}

/// All records decoded from one device's VBLK stream, before cross-linking.
#[derive(Debug, Default)]
pub struct RawRecords {
  pub disks: Vec<DiskRecord>,
  pub disk_groups: Vec<DiskGroupRecord>,
  pub partitions: Vec<PartitionRecord>,
  pub components: Vec<ComponentRecord>,
  pub volumes: Vec<VolumeRecord>,
}

struct SpannedRec {
  entries_total: u16,
  entries_found: u16,
  data: Vec<u8>,
}

/// Walk the VBLK stream starting at `vmdb_offset + vblk_first_offset`,
/// reassembling spanned records (C5) and decoding each complete record
/// (C4) into `RawRecords`.
pub fn decode_vblk_stream(
  config: &[u8],
  path: &str,
  vblk_start: usize,
  vblk_size: usize,
) -> Result<RawRecords> {
  let fragment_size = vblk_size - VBLK_HEAD_SIZE;
  let mut spanned: HashMap<u32, SpannedRec> = HashMap::new();
  let mut records = RawRecords::default();

  let mut pos = vblk_start;
  loop {
    if pos + vblk_size > config.len() {
      break;
    }
    let entry_buf = &config[pos..pos + vblk_size];
    let head = match read_vblk_head(entry_buf) {
      Some(h) => h,
      None => break,
    };

    if head.entries_total > 0 && head.entry >= head.entries_total {
      return Err(LdmError::invalid(
        path,
        format!(
          "VBLK entry {} has entry ({}) >= total entries ({})",
          head.record_id, head.entry, head.entries_total
        ),
      ));
    }

    let fragment = &entry_buf[VBLK_HEAD_SIZE..vblk_size];

    if head.entries_total <= 1 {
      decode_record(fragment, path, &mut records)?;
    } else {
      let rec = spanned.entry(head.record_id).or_insert_with(|| SpannedRec {
        entries_total: head.entries_total,
        entries_found: 0,
        data: vec![0u8; head.entries_total as usize * fragment_size],
      });
      let start = head.entry as usize * fragment_size;
      rec.data[start..start + fragment_size].copy_from_slice(fragment);
      rec.entries_found += 1;
    }

    pos += vblk_size;
  }

  let mut ids: Vec<u32> = spanned.keys().cloned().collect();
  ids.sort_unstable();
  for id in ids {
    let rec = spanned.remove(&id).unwrap();
    if rec.entries_found != rec.entries_total {
      return Err(LdmError::invalid(
        path,
        format!(
          "expected to find {} entries for record {}, but found {}",
          rec.entries_total, id, rec.entries_found
        ),
      ));
    }
    decode_record(&rec.data, path, &mut records)?;
  }

  Ok(records)
}

/// Decode one complete (possibly reassembled) VBLK record and append it to
/// `records`.
fn decode_record(data: &[u8], path: &str, records: &mut RawRecords) -> Result<()> {
  let mut c = Cursor::new(data);
  let _status = c.read_u16_be()?;
  let flags = c.read_u8()?;
  let type_rev = c.read_u8()?;
  let _size = c.read_u32_be()?;

  let kind = type_rev & 0x0F;
  let revision = type_rev >> 4;

  match kind {
    0x00 => Ok(()), // blank, ignored
    0x01 => {
      records.volumes.push(volume::parse(revision, flags, &mut c, path)?);
      Ok(())
    }
    0x02 => {
      records
        .components
        .push(component::parse(revision, flags, &mut c, path)?);
      Ok(())
    }
    0x03 => {
      records
        .partitions
        .push(partition::parse(revision, flags, &mut c, path)?);
      Ok(())
    }
    0x04 => {
      records.disks.push(disk::parse(revision, &mut c, path)?);
      Ok(())
    }
    0x05 => {
      records
        .disk_groups
        .push(disk_group::parse(revision, &mut c, path)?);
      Ok(())
    }
    other => Err(LdmError::not_supported(
      path,
      format!("unknown VBLK record kind {:#x}", other),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn vblk_entry(record_id: u32, entry: u16, entries_total: u16, payload: &[u8], fragment_size: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(VBLK_HEAD_SIZE + fragment_size);
    buf.extend_from_slice(b"VBLK");
    buf.extend_from_slice(&1u32.to_be_bytes()); // seq
    buf.extend_from_slice(&record_id.to_be_bytes());
    buf.extend_from_slice(&entry.to_be_bytes());
    buf.extend_from_slice(&entries_total.to_be_bytes());
    let mut frag = payload.to_vec();
    frag.resize(fragment_size, 0);
    buf.extend_from_slice(&frag);
    buf
  }

  fn disk_group_payload(id: u32, name: &str) -> Vec<u8> {
    let mut buf = vec![0u16 as u8, 0, 0, 0x05 | (3 << 4), 0, 0, 0, 0];
    // status(2) flags(1) type_rev(1) size(4) already pushed above as placeholders;
    // fix up properly below instead of relying on placeholder math.
    buf.clear();
    buf.extend_from_slice(&0u16.to_be_bytes()); // status
    buf.push(0); // flags
    buf.push(0x05 | (3 << 4)); // kind=5 (disk group), revision=3
    buf.extend_from_slice(&0u32.to_be_bytes()); // size
    buf.push(4); // varint len for id
    buf.extend_from_slice(&id.to_be_bytes());
    buf.push(name.len() as u8);
    buf.extend_from_slice(name.as_bytes());
    buf
  }

  #[test]
  fn single_entry_record_decodes_directly() {
    let fragment_size = 64;
    let payload = disk_group_payload(7, "DG1");
    let entry = vblk_entry(100, 0, 1, &payload, fragment_size);

    let mut config = vec![0u8; 16];
    config.extend_from_slice(&entry);

    let records = decode_vblk_stream(&config, "test", 16, VBLK_HEAD_SIZE + fragment_size).unwrap();
    assert_eq!(records.disk_groups.len(), 1);
    assert_eq!(records.disk_groups[0].id, 7);
    assert_eq!(records.disk_groups[0].name, "DG1");
  }

  #[test]
  fn spanned_record_reassembles_before_decode() {
    let fragment_size = 8;
    let full_payload = disk_group_payload(9, "LongDiskGroupName");
    assert!(full_payload.len() > fragment_size);

    let mut config = vec![0u8; 16];
    let chunks: Vec<&[u8]> = full_payload.chunks(fragment_size).collect();
    let total = chunks.len() as u16;
    for (i, chunk) in chunks.iter().enumerate() {
      let entry = vblk_entry(55, i as u16, total, chunk, fragment_size);
      config.extend_from_slice(&entry);
    }

    let records = decode_vblk_stream(&config, "test", 16, VBLK_HEAD_SIZE + fragment_size).unwrap();
    assert_eq!(records.disk_groups.len(), 1);
    assert_eq!(records.disk_groups[0].id, 9);
    assert_eq!(records.disk_groups[0].name, "LongDiskGroupName");
  }

  #[test]
  fn entry_past_total_is_invalid() {
    let entry = vblk_entry(1, 5, 3, &[0u8; 8], 8);
    let mut config = vec![0u8; 16];
    config.extend_from_slice(&entry);
    assert!(matches!(
      decode_vblk_stream(&config, "test", 16, VBLK_HEAD_SIZE + 8),
      Err(LdmError::Invalid { .. })
    ));
  }

  #[test]
  fn incomplete_spanned_record_is_invalid() {
    let fragment_size = 8;
    let entry = vblk_entry(1, 0, 2, &[1u8; 8], fragment_size);
    let mut config = vec![0u8; 16];
    config.extend_from_slice(&entry);
    assert!(matches!(
      decode_vblk_stream(&config, "test", 16, VBLK_HEAD_SIZE + fragment_size),
      Err(LdmError::Invalid { .. })
    ));
  }
}
