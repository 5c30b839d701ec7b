//! Changer (`mtx`) and drive (`mt`) control.
//!
//! Libraries and drives are always addressed through their by-id path.
//! Changer operations are checked: a nonzero exit from `mtx` means the
//! mechanical state is unknown, and the error propagates.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::CommandRunner;
use crate::platform::Dialect;
use crate::status::{self, LoadedDrive, Slot};

/// Paths of the tape control tools and the by-id directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeTools {
    /// Changer control binary.
    pub mtx: String,
    /// Drive control binary.
    pub mt: String,
    /// Directory holding the persistent device links.
    pub by_id_dir: PathBuf,
}

impl Default for TapeTools {
    fn default() -> Self {
        Self {
            mtx: "mtx".to_string(),
            mt: "mt".to_string(),
            by_id_dir: PathBuf::from(crate::config::DEFAULT_BY_ID_DIR),
        }
    }
}

impl TapeTools {
    /// Full device path of a by-id identifier.
    pub fn device_path(&self, stable_id: &str) -> String {
        device_path(&self.by_id_dir, stable_id)
    }

    fn mtx_command(&self, library: &str, args: &str) -> String {
        format!("{} -f {} {}", self.mtx, self.device_path(library), args)
    }

    fn mt_command(&self, drive: &str, args: &str) -> String {
        format!("{} -f {} {}", self.mt, self.device_path(drive), args)
    }

    /// Runs `mtx status` against a library.
    pub fn changer_status<R: CommandRunner>(&self, runner: &mut R, library: &str) -> Result<String> {
        let output = runner.run_checked(&self.mtx_command(library, "status"))?;
        Ok(output.stdout)
    }

    /// Number of drives in a library.
    pub fn drive_count<R: CommandRunner>(&self, runner: &mut R, library: &str) -> Result<usize> {
        let status = self.changer_status(runner, library)?;
        Ok(status::count_data_transfer_elements(&status))
    }

    /// Returns the volume loaded in drive `index`, if any.
    pub fn loaded<R: CommandRunner>(
        &self,
        runner: &mut R,
        library: &str,
        index: usize,
    ) -> Result<Option<LoadedDrive>> {
        let status = self.changer_status(runner, library)?;
        let loaded = status::find_loaded_drive(&status, index);
        match &loaded {
            Some(drive) => match drive.source_slot {
                Some(slot) => info!(
                    " - Drive {} is loaded with volume {} from slot {}",
                    index,
                    drive.volume_label(),
                    slot
                ),
                None => warn!(
                    " - Drive {} holds volume {} from an unknown slot",
                    index,
                    drive.volume_label()
                ),
            },
            None => info!(" - Drive {} is empty", index),
        }
        Ok(loaded)
    }

    /// Lists the full, non-cleaning slots of a library.
    pub fn full_slots<R: CommandRunner>(&self, runner: &mut R, library: &str) -> Result<Vec<Slot>> {
        let status = self.changer_status(runner, library)?;
        Ok(status::list_full_slots(&status))
    }

    /// Loads the volume in `slot` into drive `index`.
    pub fn load<R: CommandRunner>(
        &self,
        runner: &mut R,
        library: &str,
        slot: u32,
        index: usize,
    ) -> Result<()> {
        let result = runner.run(&self.mtx_command(library, &format!("load {slot} {index}")))?;
        if result.success() {
            info!(" - Loaded OK");
        } else {
            info!(" - Load FAILED");
        }
        result.check().map(|_| ())
    }

    /// Unloads drive `index` back into `slot`.
    pub fn unload<R: CommandRunner>(
        &self,
        runner: &mut R,
        library: &str,
        slot: u32,
        index: usize,
    ) -> Result<()> {
        let result = runner.run(&self.mtx_command(library, &format!("unload {slot} {index}")))?;
        if result.success() {
            info!("    - Unload successful");
        } else {
            info!("    - Unload failed");
        }
        result.check().map(|_| ())
    }

    /// Returns true if the drive reports a loaded, ready tape.
    ///
    /// A nonzero `mt status` exit is reported as not ready: drives without
    /// media fail status queries on several platforms.
    pub fn drive_ready<R: CommandRunner>(
        &self,
        runner: &mut R,
        drive: &str,
        dialect: Dialect,
    ) -> Result<bool> {
        debug!("- Checking drive by-id node '{}'", self.device_path(drive));
        let output = runner.run(&self.mt_command(drive, "status"))?;
        if !output.success() {
            debug!(" - mt status exited with {}", output.exit_code);
            return Ok(false);
        }
        Ok(status::is_drive_ready(&output.stdout, dialect))
    }

    /// Sends the `offline` command to a drive.
    pub fn offline<R: CommandRunner>(&self, runner: &mut R, drive: &str) -> Result<()> {
        info!(" - Drive {}", self.device_path(drive));
        runner.run_checked(&self.mt_command(drive, "offline"))?;
        Ok(())
    }
}

/// Joins a by-id directory and identifier without normalising either.
pub fn device_path(by_id_dir: &Path, stable_id: &str) -> String {
    by_id_dir.join(stable_id).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::executor::CommandOutput;

    /// Replays canned outputs and records the command lines it was given.
    struct Replay {
        outputs: Vec<CommandOutput>,
        seen: Vec<String>,
    }

    impl Replay {
        fn new(outputs: Vec<(i32, &str)>) -> Self {
            Self {
                outputs: outputs
                    .into_iter()
                    .rev()
                    .map(|(exit_code, stdout)| CommandOutput {
                        command: String::new(),
                        exit_code,
                        stdout: stdout.to_string(),
                        stderr: String::new(),
                    })
                    .collect(),
                seen: Vec::new(),
            }
        }
    }

    impl CommandRunner for Replay {
        fn run(&mut self, command: &str) -> Result<CommandOutput> {
            self.seen.push(command.to_string());
            let mut output = self.outputs.pop().expect("unexpected command");
            output.command = command.to_string();
            Ok(output)
        }
    }

    #[test]
    fn test_command_lines() {
        let tools = TapeTools::default();
        let mut runner = Replay::new(vec![(0, ""), (0, ""), (0, "")]);

        tools.load(&mut runner, "scsi-LIB", 3, 0).unwrap();
        tools.unload(&mut runner, "scsi-LIB", 3, 0).unwrap();
        tools.offline(&mut runner, "scsi-DRV-nst").unwrap();

        assert_eq!(
            runner.seen,
            vec![
                "mtx -f /dev/tape/by-id/scsi-LIB load 3 0",
                "mtx -f /dev/tape/by-id/scsi-LIB unload 3 0",
                "mt -f /dev/tape/by-id/scsi-DRV-nst offline",
            ]
        );
    }

    #[test]
    fn test_load_failure_carries_exit_code() {
        let tools = TapeTools::default();
        let mut runner = Replay::new(vec![(2, "")]);

        let err = tools.load(&mut runner, "scsi-LIB", 3, 1).unwrap_err();
        assert!(matches!(err, Error::CommandExit { code: 2, .. }));
    }

    #[test]
    fn test_drive_ready_treats_failure_as_not_ready() {
        let tools = TapeTools::default();
        let mut runner = Replay::new(vec![(1, "ONLINE"), (0, " BOT ONLINE IM_REP_EN")]);

        assert!(!tools.drive_ready(&mut runner, "a", Dialect::MtSt).unwrap());
        assert!(tools.drive_ready(&mut runner, "a", Dialect::MtSt).unwrap());
    }

    #[test]
    fn test_device_path() {
        assert_eq!(
            device_path(Path::new("/dev/tape/by-id"), "scsi-X"),
            "/dev/tape/by-id/scsi-X"
        );
    }
}
