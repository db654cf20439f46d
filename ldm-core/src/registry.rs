//! C7: registry of disk groups discovered across a set of scanned devices.
//!
//! Mirrors `ldm_add_fd`/`ldm_add_path` in `original_source/src/ldm.c`: each
//! device contributes a VMDB's worth of VBLKs to the disk group named by its
//! PRIVHEAD's disk-group GUID, and devices belonging to an already-known
//! group must agree on its committed sequence number.

use std::fs::File;
use std::os::unix::io::AsRawFd;

use log::debug;
use uuid::Uuid;

use crate::boundary::{locate_privhead, ReadAt};
use crate::config::load_config;
use crate::error::{LdmError, Result};
use crate::linker;
use crate::model::DiskGroup;
use crate::vblk::decode_vblk_stream;

const BLKSSZGET: libc::c_ulong = 0x1268;
const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Tracks every disk group found across all devices added so far.
#[derive(Debug, Default)]
pub struct Scanner {
  disk_groups: Vec<DiskGroup>,
}

impl Scanner {
  pub fn new() -> Self {
    Scanner { disk_groups: Vec::new() }
  }

  pub fn disk_groups(&self) -> &[DiskGroup] {
    &self.disk_groups
  }

  /// Scan one already-open device, reading its PRIVHEAD and VMDB and
  /// merging the result into the registry.
  pub fn add_device<R: ReadAt>(&mut self, reader: &mut R, path: &str, sector_size: u64) -> Result<()> {
    let privhead = locate_privhead(reader, path, sector_size)?;

    let config = load_config(reader, path, &privhead, sector_size)?;
    let records = decode_vblk_stream(
      &config.region,
      path,
      (config.vmdb.offset + config.vmdb.vblk_first_offset as u64) as usize,
      config.vmdb.vblk_size as usize,
    )?;

    let existing_idx = self.disk_groups.iter().position(|dg| dg.guid == privhead.disk_group_guid);

    let dg_idx = match existing_idx {
      Some(idx) => {
        let dg = &self.disk_groups[idx];
        if dg.sequence != config.vmdb.committed_seq {
          return Err(LdmError::Inconsistent {
            group_guid: privhead.disk_group_guid,
            first_seq: dg.sequence,
            new_seq: config.vmdb.committed_seq,
            path: path.to_string(),
          });
        }
        idx
      }
      None => {
        debug!("found new disk group: {}", privhead.disk_group_guid);
        // Disk group id/name aren't carried in PrivHead; the disk-group
        // VBLK (kind 0x05) in this device's own VMDB supplies the name.
        let dg_name = records
          .disk_groups
          .first()
          .map(|dg| dg.name.clone())
          .unwrap_or_else(|| privhead.disk_group_name.clone());
        let dg_id = records.disk_groups.first().map(|dg| dg.id).unwrap_or(0);
        let dg = linker::link(path, privhead.disk_group_guid, dg_id, dg_name, &config.vmdb, records)?;
        self.disk_groups.push(dg);
        self.disk_groups.len() - 1
      }
    };

    let dg = &mut self.disk_groups[dg_idx];
    for disk in &mut dg.disks {
      if disk.guid == privhead.disk_guid {
        disk.device = Some(path.to_string());
        disk.data_start = privhead.logical_disk_start;
        disk.data_size = privhead.logical_disk_size;
        disk.metadata_start = privhead.ldm_config_start;
        disk.metadata_size = privhead.ldm_config_size;
        break;
      }
    }

    Ok(())
  }

  /// Open and scan a device by path, determining its sector size via
  /// `ioctl(BLKSSZGET)` (falling back to 512 bytes, as the original does,
  /// when the ioctl isn't supported e.g. for a plain file).
  pub fn add_device_path(&mut self, path: &str) -> Result<()> {
    let mut file = File::open(path).map_err(|e| LdmError::io(path, e))?;
    let sector_size = detect_sector_size(&file, path);
    self.add_device(&mut file, path, sector_size)
  }
}

fn detect_sector_size(file: &File, path: &str) -> u64 {
  let mut secsize: libc::c_int = 0;
  let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKSSZGET, &mut secsize as *mut libc::c_int) };
  if rc == -1 || secsize <= 0 {
    log::warn!("unable to determine sector size of {}, assuming {} bytes", path, DEFAULT_SECTOR_SIZE);
    DEFAULT_SECTOR_SIZE
  } else {
    secsize as u64
  }
}
