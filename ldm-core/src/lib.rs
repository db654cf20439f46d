//! LDM (Microsoft Logical Disk Manager) metadata parsing and
//! device-mapper volume planning.
//!
//! The pipeline is C2 -> C3 -> (C5+C4) -> C6 -> C7 for building the
//! in-memory model from a scanned device ([`registry::Scanner::add_device`]),
//! then C8 -> C9 on demand to expose a [`model::Volume`] as a host block
//! device ([`plan::plan_volume`], [`dm::DmExecutor`]).

pub mod boundary;
pub mod config;
pub mod dm;
pub mod error;
pub mod linker;
pub mod model;
pub mod plan;
pub mod reader;
pub mod registry;
pub mod vblk;

pub use error::{LdmError, Result};
pub use model::{Disk, DiskGroup, Partition, Volume, VolumeType};
pub use plan::{plan_volume, DmTarget, Plan, PlannedDevice};
pub use registry::Scanner;
