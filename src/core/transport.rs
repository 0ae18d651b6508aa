// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{
    fs::{File, OpenOptions},
    os::unix::io::AsRawFd,
    path::Path,
};

use nix::libc::{c_ulong, ioctl as nix_ioctl};

use crate::{
    core::{
        dm_ioctl::{DM_IOCTL, DM_IOCTL_SIZE},
        errors,
    },
    result::{DmError, DmResult},
};

/// Something that can carry a devicemapper ioctl to the kernel.
///
/// `buf` holds a serialized `DmIoctl` header followed by zeroed space for
/// the reply. The kernel reads the header, writes its reply header back
/// over it, and places any payload after it.
pub trait Transport {
    /// Issue devicemapper command `cmd` with `buf` as its argument.
    fn ioctl(&self, cmd: u8, buf: &mut [u8]) -> nix::Result<()>;
}

/// The devicemapper control node, opened read-write.
#[derive(Debug)]
pub struct ControlDevice {
    file: File,
}

impl ControlDevice {
    /// Open the control node at `path`.
    pub fn open(path: &Path) -> DmResult<ControlDevice> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| {
                DmError::Core(errors::Error::ContextInit(format!(
                    "{}: {err}",
                    path.display()
                )))
            })?;
        Ok(ControlDevice { file })
    }

    /// Get the file, likely for polling purposes.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Release the control node.
    pub fn close(self) {
        drop(self.file);
    }
}

impl Transport for ControlDevice {
    fn ioctl(&self, cmd: u8, buf: &mut [u8]) -> nix::Result<()> {
        let op = nix::request_code_readwrite!(DM_IOCTL, cmd, DM_IOCTL_SIZE) as c_ulong;
        unsafe {
            nix::convert_ioctl_res!(nix_ioctl(self.file.as_raw_fd(), op, buf.as_mut_ptr()))
        }?;
        Ok(())
    }
}
