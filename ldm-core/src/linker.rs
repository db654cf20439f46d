//! C6: cross-link raw VBLK records into a [`DiskGroup`] graph, checking the
//! structural invariants the original enforces in the back half of
//! `_parse_vblks` (`original_source/src/ldm.c`).

use uuid::Uuid;

use crate::config::Vmdb;
use crate::error::{LdmError, Result};
use crate::model::{DiskGroup, Partition, Volume, VolumeType};
use crate::vblk::{ComponentKind, ComponentRecord, RawRecords, VolumeInternalKind};

/// Link a disk group's raw VBLK records into a [`DiskGroup`], deriving each
/// volume's [`VolumeType`] from its (internal kind, component kind) pairing.
pub fn link(
  path: &str,
  dg_guid: Uuid,
  dg_id: u32,
  dg_name: String,
  vmdb: &Vmdb,
  records: RawRecords,
) -> Result<DiskGroup> {
  let _ = dg_id;

  if records.disks.len() as u32 != vmdb.n_committed_vblks_disk {
    return Err(LdmError::invalid(
      path,
      format!(
        "expected {} disk VBLKs, but found {}",
        vmdb.n_committed_vblks_disk,
        records.disks.len()
      ),
    ));
  }
  if records.components.len() as u32 != vmdb.n_committed_vblks_comp {
    return Err(LdmError::invalid(
      path,
      format!(
        "expected {} component VBLKs, but found {}",
        vmdb.n_committed_vblks_comp,
        records.components.len()
      ),
    ));
  }
  if records.partitions.len() as u32 != vmdb.n_committed_vblks_part {
    return Err(LdmError::invalid(
      path,
      format!(
        "expected {} partition VBLKs, but found {}",
        vmdb.n_committed_vblks_part,
        records.partitions.len()
      ),
    ));
  }
  if records.volumes.len() as u32 != vmdb.n_committed_vblks_vol {
    return Err(LdmError::invalid(
      path,
      format!(
        "expected {} volume VBLKs, but found {}",
        vmdb.n_committed_vblks_vol,
        records.volumes.len()
      ),
    ));
  }

  let mut dg = DiskGroup {
    guid: dg_guid,
    name: dg_name,
    sequence: vmdb.committed_seq,
    disks: Vec::with_capacity(records.disks.len()),
    partitions: Vec::with_capacity(records.partitions.len()),
    volumes: Vec::with_capacity(records.volumes.len()),
  };

  for d in &records.disks {
    dg.disks.push(crate::model::Disk {
      vblk_id: d.id,
      name: d.name.clone(),
      guid: d.guid,
      device: None,
      data_start: 0,
      data_size: 0,
      metadata_start: 0,
      metadata_size: 0,
    });
  }

  // Partitions reference their disk by VBLK id; resolve to arena index now.
  for p in &records.partitions {
    let disk_idx = dg
      .disks
      .iter()
      .position(|d| d.vblk_id == p.disk_id)
      .ok_or_else(|| LdmError::invalid(path, format!("partition {} references unknown disk {}", p.id, p.disk_id)))?;

    dg.partitions.push(Partition {
      vblk_id: p.id,
      name: p.name.clone(),
      disk: disk_idx,
      start: p.start,
      vol_offset: p.vol_offset,
      size: p.size,
      index: p.index,
    });
  }

  // Group each partition under its parent component (by VBLK id), so a
  // component's parts can be sorted into index order before the volume sees
  // them.
  struct LinkedComponent<'a> {
    raw: &'a ComponentRecord,
    part_indices: Vec<usize>,
  }

  let mut linked_comps: Vec<LinkedComponent> = records
    .components
    .iter()
    .map(|c| LinkedComponent { raw: c, part_indices: Vec::new() })
    .collect();

  for (part_idx, p) in records.partitions.iter().enumerate() {
    let comp = linked_comps
      .iter_mut()
      .find(|c| c.raw.id == p.parent_id)
      .ok_or_else(|| LdmError::invalid(path, format!("didn't find parent component {} for partition {}", p.parent_id, p.id)))?;
    comp.part_indices.push(part_idx);
  }

  for comp in &mut linked_comps {
    if comp.part_indices.len() as u32 != comp.raw.n_parts {
      return Err(LdmError::invalid(
        path,
        format!(
          "component {} expected {} partitions, but found {}",
          comp.raw.id,
          comp.raw.n_parts,
          comp.part_indices.len()
        ),
      ));
    }
    if let Some(n_columns) = comp.raw.n_columns {
      if n_columns > 0 && n_columns as usize != comp.part_indices.len() {
        return Err(LdmError::invalid(
          path,
          format!(
            "component {} n_columns {} doesn't match number of partitions {}",
            comp.raw.id,
            n_columns,
            comp.part_indices.len()
          ),
        ));
      }
    }
    comp
      .part_indices
      .sort_by_key(|&idx| records.partitions[idx].index);
  }

  for v in &records.volumes {
    let mut vol_parts: Vec<usize> = Vec::new();
    let mut n_comps_seen: u32 = 0;
    let mut chunk_size = None;
    let mut n_columns = None;
    let mut volume_type = None;

    for comp in &linked_comps {
      if comp.raw.parent_id != v.id {
        continue;
      }
      n_comps_seen += 1;
      vol_parts.extend(comp.part_indices.iter().cloned());
      chunk_size = comp.raw.chunk_size;
      n_columns = comp.raw.n_columns;

      let derived = match comp.raw.kind {
        ComponentKind::Spanned => {
          if v.internal_kind != VolumeInternalKind::Gen {
            return Err(LdmError::invalid(
              path,
              format!(
                "unsupported configuration: SPANNED component has parent volume of internal kind {:?}",
                v.internal_kind
              ),
            ));
          }
          if v.n_comps > 1 {
            VolumeType::Mirrored
          } else if comp.raw.n_parts > 1 {
            VolumeType::Spanned
          } else {
            VolumeType::Simple
          }
        }
        ComponentKind::Striped => {
          if v.internal_kind != VolumeInternalKind::Gen {
            return Err(LdmError::invalid(
              path,
              format!(
                "unsupported configuration: STRIPED component has parent volume of internal kind {:?}",
                v.internal_kind
              ),
            ));
          }
          if v.n_comps != 1 {
            return Err(LdmError::invalid(
              path,
              format!(
                "unsupported configuration: STRIPED component has parent volume with {} child components",
                v.n_comps
              ),
            ));
          }
          VolumeType::Striped
        }
        ComponentKind::Raid5 => {
          if v.internal_kind != VolumeInternalKind::Raid5 {
            return Err(LdmError::invalid(
              path,
              format!(
                "unsupported configuration: RAID component has parent volume of internal kind {:?}",
                v.internal_kind
              ),
            ));
          }
          if v.n_comps != 1 {
            return Err(LdmError::invalid(
              path,
              format!(
                "unsupported configuration: RAID component has parent volume with {} child components",
                v.n_comps
              ),
            ));
          }
          VolumeType::Raid5
        }
      };
      volume_type = Some(derived);
    }

    let volume_type = volume_type.ok_or_else(|| LdmError::invalid(path, format!("didn't find parent volume {} for any component", v.id)))?;

    if n_comps_seen != v.n_comps {
      return Err(LdmError::invalid(
        path,
        format!("volume {} expected {} components, but only found {}", v.id, v.n_comps, n_comps_seen),
      ));
    }

    dg.volumes.push(Volume {
      vblk_id: v.id,
      name: v.name.clone(),
      volume_type,
      internal_kind: v.internal_kind,
      size: v.size,
      part_type: v.part_type,
      guid: v.guid,
      hint: v.hint.clone(),
      parts: vol_parts,
      chunk_size,
      n_columns,
    });
  }

  Ok(dg)
}
