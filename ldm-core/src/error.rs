use thiserror::Error;

/// LDM metadata / device-mapper planning errors.
#[derive(Debug, Error)]
pub enum LdmError {
  /// A parser contract was violated in a way that indicates a bug in this
  /// crate rather than in the metadata being read.
  #[error("internal error: {0}")]
  Internal(String),

  /// Reading from or stat'ing a device failed.
  #[error("I/O error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  /// The device carries no LDM signature at all.
  #[error("{path} does not contain LDM metadata")]
  NotLdm { path: String },

  /// The metadata is structurally wrong.
  #[error("invalid LDM metadata in {path}: {detail}")]
  Invalid { path: String, detail: String },

  /// Two members of the same disk group disagree on committed sequence.
  #[error(
    "disk group {group_guid} is inconsistent: committed sequence {first_seq} \
     (already registered) vs. {new_seq} (from {path})"
  )]
  Inconsistent {
    group_guid: uuid::Uuid,
    first_seq: u64,
    new_seq: u64,
    path: String,
  },

  /// The metadata is valid but uses a revision or combination this reader
  /// does not implement.
  #[error("unsupported LDM metadata in {path}: {detail}")]
  NotSupported { path: String, detail: String },

  /// A device-mapper plan cannot be fully assembled because an underlying
  /// disk is absent.
  #[error("disk {disk_name} required by volume {volume_name} is missing")]
  MissingDisk {
    disk_name: String,
    volume_name: String,
  },

  /// Failure reported by the device-mapper subsystem.
  #[error("device-mapper error: {0}")]
  External(String),
}

impl LdmError {
  pub(crate) fn internal(msg: impl Into<String>) -> Self {
    LdmError::Internal(msg.into())
  }

  pub(crate) fn invalid(path: &str, detail: impl Into<String>) -> Self {
    LdmError::Invalid {
      path: path.to_string(),
      detail: detail.into(),
    }
  }

  pub(crate) fn not_supported(path: &str, detail: impl Into<String>) -> Self {
    LdmError::NotSupported {
      path: path.to_string(),
      detail: detail.into(),
    }
  }

  pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
    LdmError::Io {
      path: path.to_string(),
      source,
    }
  }
}

pub type Result<T> = std::result::Result<T, LdmError>;
