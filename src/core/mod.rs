// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Modules that support handling of devicemapper ioctls at a low-level.

mod device;
mod deviceinfo;
mod dm;
mod dm_flags;
mod dm_ioctl;
mod dm_options;
mod records;
mod transport;
mod types;
mod util;
pub mod errors;

pub use self::{
    device::{devnode_to_devno, Device},
    deviceinfo::DeviceInfo,
    dm::DM,
    dm_flags::DmFlags,
    dm_ioctl::DmIoctl,
    dm_options::DmOptions,
    records::{DeviceListEntry, TargetStatus, TargetVersion},
    transport::{ControlDevice, Transport},
    types::{DevId, DmName, DmNameBuf, DmUuid, DmUuidBuf, TargetType, TargetTypeBuf},
};

#[cfg(test)]
pub(crate) use self::{dm_ioctl::DM_IOCTL_SIZE, util::align_to};
