//! Partition VBLK (kind 0x03), revision 3.
//!
//! Grounded on `_parse_vblk_part`. `index` is only present when flag bit
//! `0x08` is set; absent it defaults to 0, matching the original's
//! zero-initialized struct field.

use crate::error::{LdmError, Result};
use crate::reader::Cursor;

#[derive(Debug, Clone)]
pub struct PartitionRecord {
  pub id: u32,
  pub name: String,
  pub start: u64,
  pub vol_offset: u64,
  pub size: u64,
  pub parent_id: u32,
  pub disk_id: u32,
  pub index: u32,
}

pub(crate) fn parse(revision: u8, flags: u8, c: &mut Cursor, path: &str) -> Result<PartitionRecord> {
  if revision != 3 {
    return Err(LdmError::not_supported(
      path,
      format!("unsupported partition VBLK revision {}", revision),
    ));
  }

  let id = c.read_var_u32()?;
  let name = c.read_var_string()?;

  c.skip(4)?; // zeroes
  c.skip(8)?; // log commit id

  let start = c.read_u64_be()?;
  let vol_offset = c.read_u64_be()?;

  let size = c.read_var_u64()?;
  let parent_id = c.read_var_u32()?;
  let disk_id = c.read_var_u32()?;

  let index = if flags & 0x08 != 0 { c.read_var_u32()? } else { 0 };

  Ok(PartitionRecord {
    id,
    name,
    start,
    vol_offset,
    size,
    parent_id,
    disk_id,
    index,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn var(v: u64, width: u8) -> Vec<u8> {
    let b = v.to_be_bytes();
    let mut out = vec![width];
    out.extend_from_slice(&b[8 - width as usize..]);
    out
  }

  fn fixture(flags: u8, with_index: bool) -> Vec<u8> {
    let mut buf = var(1, 4);
    buf.push(5);
    buf.extend_from_slice(b"Part1");
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&[0u8; 8]);
    buf.extend_from_slice(&1000u64.to_be_bytes());
    buf.extend_from_slice(&0u64.to_be_bytes());
    buf.extend(var(2048, 8));
    buf.extend(var(9, 4));
    buf.extend(var(3, 4));
    if with_index {
      buf.extend(var(1, 4));
    }
    let _ = flags;
    buf
  }

  #[test]
  fn parses_without_index_flag() {
    let buf = fixture(0, false);
    let mut c = Cursor::new(&buf);
    let part = parse(3, 0, &mut c, "test").unwrap();
    assert_eq!(part.id, 1);
    assert_eq!(part.name, "Part1");
    assert_eq!(part.start, 1000);
    assert_eq!(part.size, 2048);
    assert_eq!(part.parent_id, 9);
    assert_eq!(part.disk_id, 3);
    assert_eq!(part.index, 0);
  }

  #[test]
  fn parses_with_index_flag() {
    let buf = fixture(0x08, true);
    let mut c = Cursor::new(&buf);
    let part = parse(3, 0x08, &mut c, "test").unwrap();
    assert_eq!(part.index, 1);
  }
}
