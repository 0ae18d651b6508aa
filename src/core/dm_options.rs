// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::core::{
    dm_ioctl::DmIoctl,
    types::{DevId, DmName, DmUuid},
    DmFlags,
};

/// Encapsulates options for device mapper calls
#[derive(Debug, Default, Clone)]
pub struct DmOptions {
    flags: DmFlags,
}

impl DmOptions {
    /// Set the DmFlags value for option.  Note this call is not additive in that it sets (replaces)
    /// entire flag value in one call.  Thus if you want to incrementally add additional flags you
    /// need to retrieve current and '|' with new.
    ///
    /// ```no_run
    /// use dmquery::DmFlags;
    /// use dmquery::DmOptions;
    ///
    /// let options = DmOptions::default().set_flags(DmFlags::DM_STATUS_TABLE);
    /// let flags = DmFlags::DM_NOFLUSH | options.flags();
    /// let options = options.set_flags(flags);
    /// ```
    pub fn set_flags(mut self, flags: DmFlags) -> DmOptions {
        self.flags = flags;
        self
    }

    /// Retrieve the flags value
    pub fn flags(&self) -> DmFlags {
        self.flags
    }

    /// Generate a header to be used for IOCTL. Only those of the caller's
    /// flags that appear in `allowable_flags` are passed to the kernel.
    pub(super) fn to_ioctl_hdr(&self, id: Option<&DevId<'_>>, allowable_flags: DmFlags) -> DmIoctl {
        let mut hdr = DmIoctl::new();

        hdr.flags = (allowable_flags & self.flags).bits();

        match id {
            Some(DevId::Name(name)) => hdr_set_name(&mut hdr, name),
            Some(DevId::Uuid(uuid)) => hdr_set_uuid(&mut hdr, uuid),
            Some(DevId::Device(dev)) => {
                // to_kdev_t() fails only for numbers the kernel cannot hold;
                // an all-ones dev matches no device and the kernel says so.
                hdr.dev = dev.to_kdev_t().map_or(u64::MAX, u64::from);
            }
            None => {}
        }

        hdr
    }
}

fn hdr_set_name(hdr: &mut DmIoctl, name: &DmName) {
    hdr.set_name(name.as_bytes());
}

fn hdr_set_uuid(hdr: &mut DmIoctl, uuid: &DmUuid) {
    hdr.set_uuid(uuid.as_bytes());
}
