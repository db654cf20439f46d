//! C8: translate a linked [`Volume`] into the device-mapper targets needed
//! to materialize it, without touching the device-mapper subsystem itself.
//!
//! Grounded on the `_dm_create_{spanned,striped,mirrored,raid5}` family in
//! `original_source/src/ldm.c`. Splitting planning from execution (done in
//! [`crate::dm`]) keeps the naming/degraded-mode logic unit-testable without
//! a running kernel device-mapper.

use crate::error::{LdmError, Result};
use crate::model::{DiskGroup, Volume, VolumeType};

const DM_UUID_PREFIX: &str = "LDM-";

#[derive(Debug, Clone)]
pub struct DmTarget {
  pub start: u64,
  pub size: u64,
  pub target_type: String,
  pub params: String,
}

/// One device-mapper device to create: a name, a stable UUID (used both to
/// detect an already-created device and as the udev-visible identity), and
/// its linear table.
#[derive(Debug, Clone)]
pub struct PlannedDevice {
  pub name: String,
  pub uuid: String,
  pub targets: Vec<DmTarget>,
}

/// A complete plan for one volume. `children` must be created (and waited
/// on via udev) before `volume`; on failure they must be torn down in
/// reverse order. `degraded` reflects whether any partition was skipped
/// because its disk hasn't been scanned yet.
#[derive(Debug, Clone)]
pub struct Plan {
  pub children: Vec<PlannedDevice>,
  pub volume: PlannedDevice,
  pub degraded: bool,
}

fn part_name(dg_name: &str, part_name: &str) -> String {
  format!("ldm_part_{}_{}", dg_name, part_name)
}

fn part_uuid(part_name: &str, disk_guid: &uuid::Uuid) -> String {
  format!("{}{}-{}", DM_UUID_PREFIX, part_name, disk_guid.hyphenated())
}

fn vol_name(dg_name: &str, vol_name: &str) -> String {
  format!("ldm_vol_{}_{}", dg_name, vol_name)
}

fn vol_uuid(vol_name: &str, vol_guid: &uuid::Uuid) -> String {
  format!("{}{}-{}", DM_UUID_PREFIX, vol_name, vol_guid.hyphenated())
}

/// Plan the "linear" dm device backing a single partition, as used both
/// standalone (spanned/simple volumes) and as a mirror/RAID-5 leg.
fn plan_partition_device(dg: &DiskGroup, dg_name: &str, part_id: usize) -> Option<PlannedDevice> {
  let part = dg.partition(part_id);
  let disk = dg.disk(part.disk);
  let device = disk.device.as_ref()?;

  Some(PlannedDevice {
    name: part_name(dg_name, &part.name),
    uuid: part_uuid(&part.name, &disk.guid),
    targets: vec![DmTarget {
      start: 0,
      size: part.size,
      target_type: "linear".to_string(),
      params: format!("{} {}", device, disk.data_start + part.start),
    }],
  })
}

fn plan_spanned(dg: &DiskGroup, dg_name: &str, vol: &Volume) -> Result<Plan> {
  let mut targets = Vec::with_capacity(vol.parts.len());
  let mut pos = 0u64;

  for &part_id in &vol.parts {
    let part = dg.partition(part_id);
    let disk = dg.disk(part.disk);
    let device = disk
      .device
      .as_ref()
      .ok_or_else(|| LdmError::MissingDisk {
        disk_name: disk.name.clone(),
        volume_name: vol.name.clone(),
      })?;

    if pos != part.vol_offset {
      return Err(LdmError::invalid(
        dg_name,
        "partition volume offset does not match sizes of preceding partitions",
      ));
    }

    targets.push(DmTarget {
      start: pos,
      size: part.size,
      target_type: "linear".to_string(),
      params: format!("{} {}", device, disk.data_start + part.start),
    });
    pos += part.size;
  }

  Ok(Plan {
    children: Vec::new(),
    volume: PlannedDevice {
      name: vol_name(dg_name, &vol.name),
      uuid: vol_uuid(&vol.name, &vol.guid),
      targets,
    },
    degraded: false,
  })
}

fn plan_striped(dg: &DiskGroup, dg_name: &str, vol: &Volume) -> Result<Plan> {
  let chunk_size = vol
    .chunk_size
    .ok_or_else(|| LdmError::invalid(dg_name, format!("striped volume {} has no chunk size", vol.name)))?;

  let mut params = format!("{} {}", vol.parts.len(), chunk_size);
  for &part_id in &vol.parts {
    let part = dg.partition(part_id);
    let disk = dg.disk(part.disk);
    let device = disk
      .device
      .as_ref()
      .ok_or_else(|| LdmError::MissingDisk {
        disk_name: disk.name.clone(),
        volume_name: vol.name.clone(),
      })?;
    params.push_str(&format!(" {} {}", device, disk.data_start + part.start));
  }

  Ok(Plan {
    children: Vec::new(),
    volume: PlannedDevice {
      name: vol_name(dg_name, &vol.name),
      uuid: vol_uuid(&vol.name, &vol.guid),
      targets: vec![DmTarget {
        start: 0,
        size: vol.size,
        target_type: "striped".to_string(),
        params,
      }],
    },
    degraded: false,
  })
}

/// Shared plumbing for mirrored ("raid1") and RAID-5 volumes: every
/// partition becomes its own linear dm device first, then a `raid` target
/// references each by `- <dm-dir>/<name>` (or `- -` when the disk backing
/// that leg hasn't been scanned). `min_present` is the minimum number of
/// legs that must be present for the array to still be creatable: 1 (at
/// least one survivor) for mirrored, `n - 1` (at most one missing) for
/// RAID5 — the two topologies tolerate different amounts of loss, so this
/// is passed in rather than derived from `n`.
fn plan_raid(
  dg: &DiskGroup,
  dg_name: &str,
  vol: &Volume,
  raid_type: &str,
  extra_params: &str,
  dm_dir: &str,
  min_present: usize,
) -> Result<Plan> {
  let n = vol.parts.len();
  let mut children = Vec::with_capacity(n);
  let mut legs = Vec::with_capacity(n);
  let mut n_present = 0;

  for &part_id in &vol.parts {
    match plan_partition_device(dg, dg_name, part_id) {
      Some(child) => {
        legs.push(format!("- {}/{}", dm_dir, child.name));
        n_present += 1;
        children.push(child);
      }
      None => legs.push("- -".to_string()),
    }
  }

  if n_present < min_present {
    return Err(LdmError::MissingDisk {
      disk_name: "(multiple)".to_string(),
      volume_name: vol.name.clone(),
    });
  }

  let params = format!("{} {} {}{}", raid_type, extra_params, n, legs.iter().map(|l| format!(" {l}")).collect::<String>());

  Ok(Plan {
    children,
    volume: PlannedDevice {
      name: vol_name(dg_name, &vol.name),
      uuid: vol_uuid(&vol.name, &vol.guid),
      targets: vec![DmTarget {
        start: 0,
        size: vol.size,
        target_type: "raid".to_string(),
        params,
      }],
    },
    degraded: n_present < n,
  })
}

/// Plan every dm device needed to materialize `vol`, given its disk group
/// (for naming) and the dm device directory (`/dev/mapper` in practice,
/// parameterized here for testability).
pub fn plan_volume(dg: &DiskGroup, vol: &Volume, dm_dir: &str) -> Result<Plan> {
  match vol.volume_type {
    VolumeType::Simple | VolumeType::Spanned => plan_spanned(dg, &dg.name, vol),
    VolumeType::Striped => plan_striped(dg, &dg.name, vol),
    VolumeType::Mirrored => {
      let min_present = if vol.parts.is_empty() { 0 } else { 1 };
      plan_raid(dg, &dg.name, vol, "raid1", "1 128", dm_dir, min_present)
    }
    VolumeType::Raid5 => {
      let chunk_size = vol
        .chunk_size
        .ok_or_else(|| LdmError::invalid(&dg.name, format!("raid5 volume {} has no chunk size", vol.name)))?;
      let min_present = vol.parts.len().saturating_sub(1);
      plan_raid(dg, &dg.name, vol, "raid5_ls", &format!("1 {}", chunk_size), dm_dir, min_present)
    }
  }
}
