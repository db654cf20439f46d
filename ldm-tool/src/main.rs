use std::process::exit;

use clap::{App, Arg, ArgMatches, SubCommand};
use glob::MatchOptions;
use log::error;

mod exit_codes;
mod scan;
mod volume;

/// Glob matching options for device-path arguments; case sensitive,
/// expressions don't match separators, hidden dotfiles excluded.
pub(crate) const GLOB_OPT: MatchOptions = MatchOptions {
  case_sensitive: true,
  require_literal_separator: true,
  require_literal_leading_dot: true,
};

fn device_arg() -> Arg<'static, 'static> {
  Arg::with_name("device")
    .help("Block device(s) to scan for LDM metadata; shell-glob patterns are expanded")
    .multiple(true)
    .required(true)
}

fn volume_arg() -> Arg<'static, 'static> {
  Arg::with_name("volume").long("volume").short("v").takes_value(true).required(true).help("Volume name")
}

fn group_arg() -> Arg<'static, 'static> {
  Arg::with_name("group").long("group").short("g").takes_value(true).help("Disk group name, if more than one group is scanned")
}

fn json_arg() -> Arg<'static, 'static> {
  Arg::with_name("json").long("json").help("Print machine-readable JSON instead of a table")
}

fn main() {
  env_logger::init();

  let matches = App::new("ldm-tool")
    .about("Read Windows LDM dynamic-disk metadata and expose its volumes via device-mapper")
    .subcommand(
      SubCommand::with_name("scan")
        .about("Scan devices and print the disk groups/volumes found")
        .arg(device_arg())
        .arg(json_arg()),
    )
    .subcommand(
      SubCommand::with_name("groups")
        .about("Alias for `scan`, named after the disk-group registry it prints")
        .arg(device_arg())
        .arg(json_arg()),
    )
    .subcommand(
      SubCommand::with_name("plan")
        .about("Compute (without executing) the device-mapper plan for a volume")
        .arg(device_arg())
        .arg(volume_arg())
        .arg(group_arg())
        .arg(json_arg()),
    )
    .subcommand(
      SubCommand::with_name("create")
        .about("Materialize a volume as a host block device via device-mapper")
        .arg(device_arg())
        .arg(volume_arg())
        .arg(group_arg()),
    )
    .subcommand(
      SubCommand::with_name("remove")
        .about("Tear down a volume's device-mapper device")
        .arg(device_arg())
        .arg(volume_arg())
        .arg(group_arg()),
    )
    .get_matches();

  match matches.subcommand() {
    ("scan", Some(m)) | ("groups", Some(m)) => scan::subcommand(m),
    ("plan", Some(m)) => volume::plan(m),
    ("create", Some(m)) => volume::create(m),
    ("remove", Some(m)) => volume::remove(m),
    (other, _) => {
      error!("unimplemented sub-command: {}", other);
      exit(exit_codes::CLI_ARG_ERROR);
    }
  }
}

/// Expand every device argument as a shell glob (matching `ldm` device-path
/// conventions like `/dev/sd[a-z]`), falling back to the literal path when
/// it doesn't match any glob metacharacters or doesn't resolve to anything.
pub(crate) fn expand_device_globs(matches: &ArgMatches) -> Vec<String> {
  let mut out = Vec::new();
  for pattern in matches.values_of("device").unwrap_or_default() {
    match glob::glob_with(pattern, GLOB_OPT) {
      Ok(paths) => {
        let mut matched = false;
        for entry in paths {
          if let Ok(path) = entry {
            out.push(path.to_string_lossy().into_owned());
            matched = true;
          }
        }
        if !matched {
          out.push(pattern.to_string());
        }
      }
      Err(_) => out.push(pattern.to_string()),
    }
  }
  out
}

/// Scan every device path, logging (not aborting on) per-device errors,
/// exactly as a multi-disk `add_device` loop must: one bad device shouldn't
/// prevent the rest of the group from being registered.
pub(crate) fn build_scanner(device_paths: &[String]) -> ldm_core::Scanner {
  let mut scanner = ldm_core::Scanner::new();
  for path in device_paths {
    if let Err(e) = scanner.add_device_path(path) {
      error!("{}: {}", path, e);
    }
  }
  scanner
}
