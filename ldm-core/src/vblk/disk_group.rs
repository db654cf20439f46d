//! Disk group VBLK (kind 0x05), revisions 3 and 4.
//!
//! Grounded on `_parse_vblk_disk_group`: only the id and name are needed,
//! the rest of the record is unparsed by the original and so by us.

use crate::error::{LdmError, Result};
use crate::reader::Cursor;

#[derive(Debug, Clone)]
pub struct DiskGroupRecord {
  pub id: u32,
  pub name: String,
}

pub(crate) fn parse(revision: u8, c: &mut Cursor, path: &str) -> Result<DiskGroupRecord> {
  if revision != 3 && revision != 4 {
    return Err(LdmError::not_supported(
      path,
      format!("unsupported disk group VBLK revision {}", revision),
    ));
  }

  let id = c.read_var_u32()?;
  let name = c.read_var_string()?;

  Ok(DiskGroupRecord { id, name })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_id_and_name() {
    let mut buf = vec![4, 0, 0, 0, 42];
    buf.push(3);
    buf.extend_from_slice(b"DG1");
    let mut c = Cursor::new(&buf);
    let dg = parse(3, &mut c, "test").unwrap();
    assert_eq!(dg.id, 42);
    assert_eq!(dg.name, "DG1");
  }

  #[test]
  fn unsupported_revision_rejected() {
    let buf = vec![4, 0, 0, 0, 1, 2, b'x', b'y'];
    let mut c = Cursor::new(&buf);
    assert!(matches!(parse(7, &mut c, "test"), Err(LdmError::NotSupported { .. })));
  }
}
