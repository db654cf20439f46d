//! Component VBLK (kind 0x02), revision 3.
//!
//! Grounded on `_parse_vblk_comp`. `chunk_size`/`n_columns` only appear when
//! flag bit `0x10` is set (striped and RAID-5 components); spanned
//! components carry neither.

use crate::error::{LdmError, Result};
use crate::reader::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
  Striped,
  Spanned,
  Raid5,
}

#[derive(Debug, Clone)]
pub struct ComponentRecord {
  pub id: u32,
  pub kind: ComponentKind,
  pub n_parts: u32,
  pub parent_id: u32,
  pub chunk_size: Option<u64>,
  pub n_columns: Option<u32>,
}

pub(crate) fn parse(revision: u8, flags: u8, c: &mut Cursor, path: &str) -> Result<ComponentRecord> {
  if revision != 3 {
    return Err(LdmError::not_supported(
      path,
      format!("unsupported component VBLK revision {}", revision),
    ));
  }

  let id = c.read_var_u32()?;
  c.skip_var()?; // name
  c.skip_var()?; // volume state

  let raw_type = c.read_u8()?;
  let kind = match raw_type {
    0x1 => ComponentKind::Striped,
    0x2 => ComponentKind::Spanned,
    0x3 => ComponentKind::Raid5,
    other => {
      return Err(LdmError::not_supported(
        path,
        format!("component {} has unsupported type {}", id, other),
      ))
    }
  };

  c.skip(4)?; // zeroes

  let n_parts = c.read_var_u32()?;

  c.skip(8)?; // log commit id
  c.skip(8)?; // zeroes

  let parent_id = c.read_var_u32()?;

  c.skip(1)?; // zeroes

  let (chunk_size, n_columns) = if flags & 0x10 != 0 {
    (Some(c.read_var_u64()?), Some(c.read_var_u32()?))
  } else {
    (None, None)
  };

  Ok(ComponentRecord {
    id,
    kind,
    n_parts,
    parent_id,
    chunk_size,
    n_columns,
  })
}
