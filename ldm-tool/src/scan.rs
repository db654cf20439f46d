use std::process::exit;

use clap::ArgMatches;
use serde::Serialize;
use tabled::{Table, Tabled};

use ldm_core::{Disk, DiskGroup, Volume, VolumeType};

use crate::exit_codes;

/// `scan`/`groups` entry point: scan every device given and print what was
/// found about the disk groups and volumes it described.
pub(crate) fn subcommand(matches: &ArgMatches) {
  let devices = crate::expand_device_globs(matches);
  if devices.is_empty() {
    eprintln!("no devices given");
    exit(exit_codes::CLI_ARG_ERROR);
  }

  let scanner = crate::build_scanner(&devices);

  if matches.is_present("json") {
    let groups: Vec<JsonDiskGroup> = scanner.disk_groups().iter().map(JsonDiskGroup::from).collect();
    println!("{}", serde_json::to_string(&groups).unwrap());
    return;
  }

  for dg in scanner.disk_groups() {
    println!("Disk group {} ({})", dg.name, dg.guid);
    println!("{}", Table::new(disk_rows(dg)).to_string());
    println!("{}", Table::new(volume_rows(dg)).to_string());
    println!();
  }
}

fn disk_rows(dg: &DiskGroup) -> Vec<DiskRow> {
  dg.disks
    .iter()
    .map(|d: &Disk| DiskRow {
      name: d.name.clone(),
      device: d.device.clone().unwrap_or_else(|| "(missing)".to_string()),
      guid: d.guid.to_string(),
    })
    .collect()
}

fn volume_rows(dg: &DiskGroup) -> Vec<VolumeRow> {
  dg.volumes
    .iter()
    .map(|v: &Volume| VolumeRow {
      name: v.name.clone(),
      volume_type: volume_type_str(v.volume_type).to_string(),
      size_sectors: v.size,
      missing_disks: dg.volume_missing_disks(v).len(),
    })
    .collect()
}

fn volume_type_str(t: VolumeType) -> &'static str {
  match t {
    VolumeType::Simple => "simple",
    VolumeType::Spanned => "spanned",
    VolumeType::Striped => "striped",
    VolumeType::Mirrored => "mirrored",
    VolumeType::Raid5 => "raid5",
  }
}

#[derive(Tabled)]
struct DiskRow {
  #[tabled(rename = "Disk")]
  name: String,
  #[tabled(rename = "Device")]
  device: String,
  #[tabled(rename = "GUID")]
  guid: String,
}

#[derive(Tabled)]
struct VolumeRow {
  #[tabled(rename = "Volume")]
  name: String,
  #[tabled(rename = "Type")]
  volume_type: String,
  #[tabled(rename = "Size (sectors)")]
  size_sectors: u64,
  #[tabled(rename = "Missing disks")]
  missing_disks: usize,
}

#[derive(Serialize)]
struct JsonDiskGroup {
  name: String,
  guid: String,
  sequence: u64,
  disks: Vec<JsonDisk>,
  volumes: Vec<JsonVolume>,
}

#[derive(Serialize)]
struct JsonDisk {
  name: String,
  guid: String,
  device: Option<String>,
}

#[derive(Serialize)]
struct JsonVolume {
  name: String,
  guid: String,
  #[serde(rename = "type")]
  volume_type: &'static str,
  size_sectors: u64,
  missing_disks: usize,
}

impl From<&DiskGroup> for JsonDiskGroup {
  fn from(dg: &DiskGroup) -> Self {
    JsonDiskGroup {
      name: dg.name.clone(),
      guid: dg.guid.to_string(),
      sequence: dg.sequence,
      disks: dg.disks.iter().map(|d| JsonDisk { name: d.name.clone(), guid: d.guid.to_string(), device: d.device.clone() }).collect(),
      volumes: dg
        .volumes
        .iter()
        .map(|v| JsonVolume {
          name: v.name.clone(),
          guid: v.guid.to_string(),
          volume_type: volume_type_str(v.volume_type),
          size_sectors: v.size,
          missing_disks: dg.volume_missing_disks(v).len(),
        })
        .collect(),
    }
  }
}
