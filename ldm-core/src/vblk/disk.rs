//! Disk VBLK (kind 0x04), revisions 3 and 4.
//!
//! Grounded on `_parse_vblk_disk` in `original_source/src/ldm.c`: revision 3
//! carries the disk GUID as ASCII text, revision 4 as raw bytes. Neither
//! revision has anything else worth keeping past the GUID.

use uuid::Uuid;

use crate::error::{LdmError, Result};
use crate::reader::Cursor;

#[derive(Debug, Clone)]
pub struct DiskRecord {
  pub id: u32,
  pub name: String,
  pub guid: Uuid,
}

pub(crate) fn parse(revision: u8, c: &mut Cursor, path: &str) -> Result<DiskRecord> {
  let id = c.read_var_u32()?;
  let name = c.read_var_string()?;

  let guid = match revision {
    3 => {
      let text = c.read_var_string()?;
      Uuid::parse_str(text.trim()).map_err(|_| LdmError::invalid(path, format!("disk {} has invalid guid: {}", id, text)))?
    }
    4 => {
      let bytes = c.read_bytes(16)?;
      Uuid::from_slice(bytes).map_err(|_| LdmError::invalid(path, format!("disk {} has malformed guid bytes", id)))?
    }
    other => {
      return Err(LdmError::not_supported(
        path,
        format!("unsupported disk VBLK revision {}", other),
      ))
    }
  };

  Ok(DiskRecord { id, name, guid })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn var_u32(v: u32) -> Vec<u8> {
    let b = v.to_be_bytes();
    vec![4, b[0], b[1], b[2], b[3]]
  }

  fn var_str(s: &str) -> Vec<u8> {
    let mut v = vec![s.len() as u8];
    v.extend_from_slice(s.as_bytes());
    v
  }

  #[test]
  fn revision_3_parses_text_guid() {
    let guid = Uuid::new_v4();
    let mut buf = var_u32(1);
    buf.extend(var_str("Disk1"));
    buf.extend(var_str(&guid.to_string()));
    let mut c = Cursor::new(&buf);
    let disk = parse(3, &mut c, "test").unwrap();
    assert_eq!(disk.id, 1);
    assert_eq!(disk.name, "Disk1");
    assert_eq!(disk.guid, guid);
  }

  #[test]
  fn revision_4_parses_raw_guid_bytes() {
    let guid = Uuid::new_v4();
    let mut buf = var_u32(2);
    buf.extend(var_str("Disk2"));
    buf.extend_from_slice(guid.as_bytes());
    let mut c = Cursor::new(&buf);
    let disk = parse(4, &mut c, "test").unwrap();
    assert_eq!(disk.guid, guid);
  }

  #[test]
  fn unsupported_revision_is_not_supported() {
    let mut buf = var_u32(1);
    buf.extend(var_str("Disk1"));
    let mut c = Cursor::new(&buf);
    assert!(matches!(parse(9, &mut c, "test"), Err(LdmError::NotSupported { .. })));
  }
}
