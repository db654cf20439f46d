use std::process::exit;

use clap::ArgMatches;
use log::info;

use ldm_core::dm::{CreateOutcome, DmExecutor, RemoveOutcome};
use ldm_core::{plan_volume, DiskGroup, LdmError, Plan, Scanner, Volume};

use crate::exit_codes;

const DM_DIR: &str = "/dev/mapper";

fn find_volume<'a>(scanner: &'a Scanner, group: Option<&str>, volume_name: &str) -> (&'a DiskGroup, &'a Volume) {
  let candidates: Vec<(&DiskGroup, &Volume)> = scanner
    .disk_groups()
    .iter()
    .filter(|dg| group.map_or(true, |g| dg.name == g))
    .flat_map(|dg| dg.volumes.iter().map(move |v| (dg, v)))
    .filter(|(_, v)| v.name == volume_name)
    .collect();

  match candidates.len() {
    0 => {
      eprintln!("no volume named '{}' found among the scanned devices", volume_name);
      exit(exit_codes::NOT_FOUND_ERR);
    }
    1 => candidates[0],
    _ => {
      eprintln!(
        "volume name '{}' is ambiguous across {} disk groups; pass --group to disambiguate",
        volume_name,
        candidates.len()
      );
      exit(exit_codes::NOT_FOUND_ERR);
    }
  }
}

fn scan_and_plan(matches: &ArgMatches) -> Plan {
  let devices = crate::expand_device_globs(matches);
  let scanner = crate::build_scanner(&devices);

  let group = matches.value_of("group");
  let volume_name = matches.value_of("volume").expect("--volume is required");
  let (dg, vol) = find_volume(&scanner, group, volume_name);

  match plan_volume(dg, vol, DM_DIR) {
    Ok(plan) => plan,
    Err(LdmError::MissingDisk { disk_name, volume_name }) => {
      eprintln!("cannot plan volume {}: disk {} is missing and the volume cannot tolerate it", volume_name, disk_name);
      exit(exit_codes::DM_ERR);
    }
    Err(e) => {
      eprintln!("failed to plan volume {}: {}", volume_name, e);
      exit(exit_codes::DM_ERR);
    }
  }
}

/// `plan` entry point: compute and print the plan without touching
/// device-mapper.
pub(crate) fn plan(matches: &ArgMatches) {
  let plan = scan_and_plan(matches);

  if matches.is_present("json") {
    println!("{}", serde_json::to_string(&JsonPlan::from(&plan)).unwrap());
    return;
  }

  if plan.degraded {
    println!("plan is DEGRADED (at least one backing disk is missing)");
  }
  for child in &plan.children {
    print_device(child);
  }
  print_device(&plan.volume);
}

fn print_device(d: &ldm_core::PlannedDevice) {
  println!("{} (uuid {})", d.name, d.uuid);
  for t in &d.targets {
    println!("  {} {} {} {}", t.start, t.size, t.target_type, t.params);
  }
}

/// `create` entry point: plan, then materialize the volume via
/// device-mapper.
pub(crate) fn create(matches: &ArgMatches) {
  let plan = scan_and_plan(matches);

  let executor = match DmExecutor::new() {
    Ok(e) => e,
    Err(e) => {
      eprintln!("failed to open device-mapper control device: {}", e);
      exit(exit_codes::DM_ERR);
    }
  };

  match executor.create(&plan) {
    Ok(CreateOutcome::Created(name)) => println!("created {}", name),
    Ok(CreateOutcome::AlreadyExists(name)) => {
      info!("{} already exists, nothing to do", name);
      println!("{} already exists", name);
    }
    Err(e) => {
      eprintln!("failed to create volume: {}", e);
      exit(exit_codes::DM_ERR);
    }
  }
}

/// `remove` entry point: tear down a volume's top-level device-mapper
/// device, then deactivate its children (legs of a mirrored/RAID-5 volume).
pub(crate) fn remove(matches: &ArgMatches) {
  let plan = scan_and_plan(matches);

  let executor = match DmExecutor::new() {
    Ok(e) => e,
    Err(e) => {
      eprintln!("failed to open device-mapper control device: {}", e);
      exit(exit_codes::DM_ERR);
    }
  };

  match executor.remove(&plan) {
    Ok(RemoveOutcome::Removed(name)) => println!("removed {}", name),
    Ok(RemoveOutcome::DidNotExist) => println!("{} did not exist", plan.volume.name),
    Err(e) => {
      eprintln!("failed to remove volume: {}", e);
      exit(exit_codes::DM_ERR);
    }
  }
}

#[derive(serde::Serialize)]
struct JsonPlan {
  degraded: bool,
  children: Vec<JsonDevice>,
  volume: JsonDevice,
}

#[derive(serde::Serialize)]
struct JsonDevice {
  name: String,
  uuid: String,
  targets: Vec<JsonTarget>,
}

#[derive(serde::Serialize)]
struct JsonTarget {
  start: u64,
  size: u64,
  kind: String,
  params: String,
}

impl From<&ldm_core::PlannedDevice> for JsonDevice {
  fn from(d: &ldm_core::PlannedDevice) -> Self {
    JsonDevice {
      name: d.name.clone(),
      uuid: d.uuid.clone(),
      targets: d
        .targets
        .iter()
        .map(|t| JsonTarget {
          start: t.start,
          size: t.size,
          kind: t.target_type.clone(),
          params: t.params.clone(),
        })
        .collect(),
    }
  }
}

impl From<&Plan> for JsonPlan {
  fn from(p: &Plan) -> Self {
    JsonPlan {
      degraded: p.degraded,
      children: p.children.iter().map(JsonDevice::from).collect(),
      volume: JsonDevice::from(&p.volume),
    }
  }
}
