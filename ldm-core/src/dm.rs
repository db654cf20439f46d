//! C9: execute a [`crate::plan::Plan`] against the kernel device-mapper,
//! using the `devicemapper` crate instead of linking directly against
//! libdevicemapper as `original_source/src/ldm.c` does.
//!
//! Mirrors `ldm_volume_dm_create`/`ldm_volume_dm_remove`: look the volume's
//! UUID up in the existing device tree first (idempotent create), create
//! any child "part" devices a mirrored/RAID-5 volume needs before its own
//! table is loaded, and tear down whatever was already created if a later
//! step fails.

use std::process::Command;
use std::sync::Mutex;

use devicemapper::{DevId, DmError, DmFlags, DmName, DmOptions, DmUuid, DM};

use crate::error::{LdmError, Result};
use crate::plan::{Plan, PlannedDevice};

/// Outcome of [`DmExecutor::create`]/[`DmExecutor::remove`]: whether the
/// call actually changed device-mapper state or found the volume already in
/// (or already out of) the desired state. Mirrors the scanner interface's
/// `create_volume`/`remove_volume` contract (spec.md §6): "name of created
/// device (or indication it already existed)".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
  Created(String),
  AlreadyExists(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
  Removed(String),
  DidNotExist,
}

/// Wraps a `devicemapper::DM` handle and remembers the last error reported
/// by the subsystem, mirroring the original's single global `_dm_err_last_*`
/// state (see `original_source/src/ldm.c`) without actually using global
/// mutable state.
pub struct DmExecutor {
  dm: DM,
  last_error: Mutex<Option<String>>,
}

/// True if a `DmError` is the kernel reporting `EBUSY` on removal, i.e. the
/// device still has an open table user (typically a mount).
fn is_device_busy(e: &DmError) -> bool {
  matches!(e, DmError::Core(_)) && e.to_string().to_lowercase().contains("busy")
}

impl DmExecutor {
  pub fn new() -> Result<Self> {
    let dm = DM::new().map_err(|e| LdmError::External(format!("failed to open device-mapper control device: {e}")))?;
    Ok(DmExecutor {
      dm,
      last_error: Mutex::new(None),
    })
  }

  /// The most recently recorded device-mapper error message, if any.
  pub fn last_error(&self) -> Option<String> {
    self.last_error.lock().expect("lock poisoned").clone()
  }

  fn record_error(&self, msg: String) -> LdmError {
    *self.last_error.lock().expect("lock poisoned") = Some(msg.clone());
    LdmError::External(msg)
  }

  /// True if a device-mapper device with this UUID already exists.
  fn uuid_exists(&self, uuid: &str) -> Result<bool> {
    let dm_uuid = DmUuid::new(uuid).map_err(|e| self.record_error(format!("invalid dm uuid {uuid}: {e}")))?;
    match self.dm.device_info(&DevId::Uuid(dm_uuid)) {
      Ok(_) => Ok(true),
      Err(DmError::Core(_)) => Ok(false),
      Err(e) => Err(self.record_error(format!("device_info({uuid}): {e}"))),
    }
  }

  fn create_device(&self, planned: &PlannedDevice) -> Result<()> {
    let name = DmName::new(&planned.name).map_err(|e| self.record_error(format!("invalid dm name {}: {e}", planned.name)))?;
    let uuid = DmUuid::new(&planned.uuid).map_err(|e| self.record_error(format!("invalid dm uuid {}: {e}", planned.uuid)))?;

    self
      .dm
      .device_create(name, Some(uuid), DmOptions::default())
      .map_err(|e| self.record_error(format!("device_create({}): {e}", planned.name)))?;

    let id = DevId::Name(name);
    let table: Vec<(u64, u64, String, String)> = planned
      .targets
      .iter()
      .map(|t| (t.start, t.size, t.target_type.clone(), t.params.clone()))
      .collect();

    if let Err(e) = self.dm.table_load(&id, &table, DmOptions::default()) {
      let _ = self.dm.device_remove(&id, DmOptions::default());
      return Err(self.record_error(format!("table_load({}): {e}", planned.name)));
    }

    // A freshly created device carries only an *inactive* table; the
    // DM_DEVICE_SUSPEND ioctl doubles as "activate" when issued without the
    // suspend flag (it promotes the inactive table to active), and as an
    // actual suspend when the flag is set. We want the former here.
    if let Err(e) = self.dm.device_suspend(&id, DmOptions::default()) {
      let _ = self.dm.device_remove(&id, DmOptions::default());
      return Err(self.record_error(format!("activate({}): {e}", planned.name)));
    }

    Ok(())
  }

  /// Block until udev has finished processing the uevents our table loads
  /// just generated. `devicemapper-rs` talks to the kernel ioctl interface
  /// directly rather than linking libdevicemapper, so it has no equivalent
  /// of `dm_task_set_cookie`/`dm_udev_wait`; shelling out to `udevadm
  /// settle` is the userspace-visible barrier with the same effect (a
  /// top-level target must never be loaded before udev has named the
  /// helper devices it references by path). A missing `udevadm` is logged
  /// and otherwise ignored rather than treated as fatal: the dm state
  /// itself is already correct, only the udev-visible device nodes might
  /// lag.
  fn udev_settle(&self) {
    match Command::new("udevadm").arg("settle").output() {
      Ok(output) if !output.status.success() => {
        log::warn!("udevadm settle exited with {}", output.status);
      }
      Err(e) => log::warn!("failed to run udevadm settle: {e}"),
      Ok(_) => {}
    }
  }

  fn remove_device(&self, name: &str) -> Result<()> {
    let dm_name = DmName::new(name).map_err(|e| self.record_error(format!("invalid dm name {name}: {e}")))?;
    let id = DevId::Name(dm_name);

    // The original retries a removal once in case the device was only
    // transiently held open; devicemapper-rs exposes the same retry flag.
    let options = DmOptions::default().set_flags(DmFlags::DM_DEVICE_REMOVE_RETRY);
    self.dm.device_remove(&id, options).map_err(|e| {
      if is_device_busy(&e) {
        self.record_error("Device is still mounted".to_string())
      } else {
        self.record_error(format!("device_remove({name}): {e}"))
      }
    })?;
    Ok(())
  }

  /// Create every device-mapper device needed for `plan`, in order
  /// (children, then the volume itself), with a udev barrier between the
  /// two stages: the volume's table references helper devices by
  /// `/dev/mapper/<name>` path, so those names must already exist before
  /// its table is loaded (spec ordering guarantee: a volume is created
  /// only after every helper it references, and the udev barrier for
  /// those helpers, has completed). Already-existing devices (matched by
  /// UUID) are left untouched and treated as success, matching
  /// `ldm_volume_dm_create`'s idempotency. On failure, any children
  /// already created in this call are removed (best-effort) before the
  /// error is returned.
  pub fn create(&self, plan: &Plan) -> Result<CreateOutcome> {
    if self.uuid_exists(&plan.volume.uuid)? {
      return Ok(CreateOutcome::AlreadyExists(plan.volume.name.clone()));
    }

    let mut created_children: Vec<&str> = Vec::new();
    for child in &plan.children {
      if let Err(e) = self.create_device(child) {
        for name in created_children.iter().rev() {
          let _ = self.remove_device(name);
        }
        return Err(e);
      }
      created_children.push(&child.name);
    }

    if !plan.children.is_empty() {
      self.udev_settle();
    }

    if let Err(e) = self.create_device(&plan.volume) {
      for name in created_children.iter().rev() {
        let _ = self.remove_device(name);
      }
      return Err(e);
    }
    self.udev_settle();

    Ok(CreateOutcome::Created(plan.volume.name.clone()))
  }

  /// Remove the top-level volume device named in `plan`, then deactivate
  /// its children (the per-leg linear devices of a mirrored/RAID-5
  /// volume), mirroring `ldm_volume_dm_remove`'s
  /// `_dm_remove` + `dm_tree_deactivate_children` ordering. Unlike
  /// `create`'s rollback, a failure to remove a child here is not
  /// swallowed: the parent is already gone, so the caller needs to know
  /// the children are now orphaned dm devices.
  pub fn remove(&self, plan: &Plan) -> Result<RemoveOutcome> {
    if !self.uuid_exists(&plan.volume.uuid)? {
      return Ok(RemoveOutcome::DidNotExist);
    }
    self.remove_device(&plan.volume.name)?;
    for child in &plan.children {
      self.remove_device(&child.name)?;
    }
    Ok(RemoveOutcome::Removed(plan.volume.name.clone()))
  }
}
