//! Volume VBLK (kind 0x01), revision 5.
//!
//! Grounded on `_parse_vblk_vol`. Several fields are skipped as raw bytes
//! rather than VarInt/VarStr (the 14-byte volume state block, and a handful
//! of reserved/zero fields) exactly as the original does; only the trailing
//! optional fields are gated on the record's flag byte.

use uuid::Uuid;

use crate::error::{LdmError, Result};
use crate::reader::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeInternalKind {
  Gen,
  Raid5,
}

#[derive(Debug, Clone)]
pub struct VolumeRecord {
  pub id: u32,
  pub name: String,
  pub internal_kind: VolumeInternalKind,
  pub flags: u8,
  pub n_comps: u32,
  pub size: u64,
  pub part_type: u8,
  pub guid: Uuid,
  pub id1: Option<String>,
  pub id2: Option<String>,
  pub size2: Option<u64>,
  pub hint: Option<String>,
}

pub(crate) fn parse(revision: u8, head_flags: u8, c: &mut Cursor, path: &str) -> Result<VolumeRecord> {
  if revision != 5 {
    return Err(LdmError::not_supported(
      path,
      format!("unsupported volume VBLK revision {}", revision),
    ));
  }

  let id = c.read_var_u32()?;
  let name = c.read_var_string()?;

  c.skip_var()?; // volume type text ("gen"/"raid5"), redundant with int_type below
  c.skip_var()?; // unknown

  c.skip(14)?; // volume state

  let int_type = c.read_u8()?;
  let internal_kind = match int_type {
    0x3 => VolumeInternalKind::Gen,
    0x4 => VolumeInternalKind::Raid5,
    other => {
      return Err(LdmError::not_supported(
        path,
        format!("volume {} has unsupported type {}", id, other),
      ))
    }
  };

  c.skip(1)?; // unknown
  c.skip(1)?; // volume number
  c.skip(3)?; // zeroes

  let flags = c.read_u8()?;

  let n_comps = c.read_var_u32()?;

  c.skip(8)?; // commit id
  c.skip(8)?; // id?

  let size = c.read_var_u64()?;

  c.skip(4)?; // zeroes

  let part_type = c.read_u8()?;

  let guid_bytes = c.read_bytes(16)?;
  let guid = Uuid::from_slice(guid_bytes).map_err(|_| LdmError::invalid(path, format!("volume {} has malformed guid bytes", id)))?;

  let id1 = if head_flags & 0x08 != 0 { Some(c.read_var_string()?) } else { None };
  let id2 = if head_flags & 0x20 != 0 { Some(c.read_var_string()?) } else { None };
  let size2 = if head_flags & 0x80 != 0 { Some(c.read_var_u64()?) } else { None };
  let hint = if head_flags & 0x02 != 0 { Some(c.read_var_string()?) } else { None };

  Ok(VolumeRecord {
    id,
    name,
    internal_kind,
    flags,
    n_comps,
    size,
    part_type,
    guid,
    id1,
    id2,
    size2,
    hint,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn var_str(s: &str) -> Vec<u8> {
    let mut v = vec![s.len() as u8];
    v.extend_from_slice(s.as_bytes());
    v
  }

  fn var(v: u64, width: u8) -> Vec<u8> {
    let b = v.to_be_bytes();
    let mut out = vec![width];
    out.extend_from_slice(&b[8 - width as usize..]);
    out
  }

  fn fixture(head_flags: u8, with_id1: bool, with_hint: bool) -> Vec<u8> {
    let mut buf = var(1, 4);
    buf.extend(var_str("Vol1"));
    buf.extend(var_str("gen"));
    buf.extend(var_str("")); // unknown
    buf.extend_from_slice(&[0u8; 14]); // volume state
    buf.push(0x3); // int_type Gen
    buf.push(0); // unknown
    buf.push(0); // volume number
    buf.extend_from_slice(&[0u8; 3]);
    buf.push(0); // flags (own record byte)
    buf.extend(var(0, 4)); // n_comps
    buf.extend_from_slice(&[0u8; 8]); // commit id
    buf.extend_from_slice(&[0u8; 8]); // id?
    buf.extend(var(4096, 8)); // size
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(7); // part_type
    buf.extend_from_slice(Uuid::nil().as_bytes());
    if with_id1 {
      buf.extend(var_str("id1val"));
    }
    if with_hint {
      buf.extend(var_str("myhint"));
    }
    let _ = head_flags;
    buf
  }

  #[test]
  fn parses_minimal_record() {
    let buf = fixture(0, false, false);
    let mut c = Cursor::new(&buf);
    let vol = parse(5, 0, &mut c, "test").unwrap();
    assert_eq!(vol.id, 1);
    assert_eq!(vol.name, "Vol1");
    assert_eq!(vol.internal_kind, VolumeInternalKind::Gen);
    assert_eq!(vol.size, 4096);
    assert_eq!(vol.part_type, 7);
    assert!(vol.id1.is_none());
    assert!(vol.hint.is_none());
  }

  #[test]
  fn optional_fields_gated_on_head_flags() {
    let buf = fixture(0x08 | 0x02, true, true);
    let mut c = Cursor::new(&buf);
    let vol = parse(5, 0x08 | 0x02, &mut c, "test").unwrap();
    assert_eq!(vol.id1.as_deref(), Some("id1val"));
    assert_eq!(vol.hint.as_deref(), Some("myhint"));
    assert!(vol.id2.is_none());
    assert!(vol.size2.is_none());
  }

  #[test]
  fn unsupported_internal_type_rejected() {
    let mut buf = var(1, 4);
    buf.extend(var_str("Vol1"));
    buf.extend(var_str("gen"));
    buf.extend(var_str(""));
    buf.extend_from_slice(&[0u8; 14]);
    buf.push(0x9);
    let mut c = Cursor::new(&buf);
    assert!(matches!(parse(5, 0, &mut c, "test"), Err(LdmError::NotSupported { .. })));
  }
}
