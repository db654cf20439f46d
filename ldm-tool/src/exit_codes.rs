/// CLI argument error
pub(crate) const CLI_ARG_ERROR: i32 = 1;
/// Device scan error (I/O, not-LDM, invalid metadata, inconsistent group)
pub(crate) const SCAN_ERR: i32 = 2;
/// Requested volume or disk group not found among scanned devices
pub(crate) const NOT_FOUND_ERR: i32 = 3;
/// Device-mapper planning or execution error
pub(crate) const DM_ERR: i32 = 4;
