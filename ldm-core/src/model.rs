//! Cross-linked, in-memory representation of an LDM disk group.
//!
//! The original keeps disks/partitions/components/volumes as
//! reference-counted `GObject`s threaded together with raw pointers back and
//! forth (see the `LDM*Private` structs in `original_source/src/ldm.c`).
//! Here each disk group owns flat arenas and every cross-reference is a
//! plain index into the owning arena, so the graph has no cycles and no
//! shared ownership to reason about.

use uuid::Uuid;

use crate::vblk::VolumeInternalKind;

pub type DiskId = usize;
pub type PartitionId = usize;
pub type ComponentId = usize;
pub type VolumeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeType {
  Simple,
  Spanned,
  Striped,
  Mirrored,
  Raid5,
}

/// A physical disk, as known to a disk group. `device` and the `*_start`/
/// `*_size` fields are only populated once a matching device has actually
/// been scanned (see [`crate::registry`]); until then a disk is known only
/// by the VBLK fields.
#[derive(Debug, Clone)]
pub struct Disk {
  pub vblk_id: u32,
  pub name: String,
  pub guid: Uuid,
  pub device: Option<String>,
  pub data_start: u64,
  pub data_size: u64,
  pub metadata_start: u64,
  pub metadata_size: u64,
}

impl Disk {
  pub fn is_present(&self) -> bool {
    self.device.is_some()
  }
}

#[derive(Debug, Clone)]
pub struct Partition {
  pub vblk_id: u32,
  pub name: String,
  pub disk: DiskId,
  pub start: u64,
  pub vol_offset: u64,
  pub size: u64,
  pub index: u32,
}

#[derive(Debug, Clone)]
pub struct Volume {
  pub vblk_id: u32,
  pub name: String,
  pub volume_type: VolumeType,
  pub internal_kind: VolumeInternalKind,
  pub size: u64,
  pub part_type: u8,
  pub guid: Uuid,
  pub hint: Option<String>,
  /// Partitions making up this volume, in on-disk index order within each
  /// component and component order as encountered during linking.
  pub parts: Vec<PartitionId>,
  pub chunk_size: Option<u64>,
  pub n_columns: Option<u32>,
}

/// A fully linked disk group: every partition/component/volume
/// cross-reference has been resolved to an index into one of these arenas.
#[derive(Debug, Clone, Default)]
pub struct DiskGroup {
  pub guid: Uuid,
  pub name: String,
  pub sequence: u64,
  pub disks: Vec<Disk>,
  pub partitions: Vec<Partition>,
  pub volumes: Vec<Volume>,
}

impl DiskGroup {
  pub fn disk(&self, id: DiskId) -> &Disk {
    &self.disks[id]
  }

  pub fn partition(&self, id: PartitionId) -> &Partition {
    &self.partitions[id]
  }

  pub fn volume(&self, id: VolumeId) -> &Volume {
    &self.volumes[id]
  }

  /// A volume is usable for DM planning only if every disk backing its
  /// partitions has actually been scanned.
  pub fn volume_missing_disks(&self, volume: &Volume) -> Vec<&Disk> {
    volume
      .parts
      .iter()
      .map(|&p| self.disk(self.partition(p).disk))
      .filter(|d| !d.is_present())
      .collect()
  }
}
