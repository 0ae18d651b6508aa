// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use semver::Version;

use crate::{
    core::{
        device::Device,
        dm_flags::DmFlags,
        dm_ioctl::DmIoctl,
        errors,
        types::{DmName, DmNameBuf, DmUuid, DmUuidBuf},
        util::slice_to_null,
    },
    result::{DmError, DmResult},
};

/// Contains information about the device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    version: Version,

    data_size: u32,
    data_start: u32,
    target_count: u32,

    open_count: i32,
    flags: DmFlags,
    event_nr: u32,
    dev: Device,
    name: Option<DmNameBuf>,
    uuid: Option<DmUuidBuf>,
}

/// Read a fixed-width id field. The field must contain its trailing \0.
fn id_field(field: &[u8], what: &str) -> DmResult<Option<String>> {
    let value = slice_to_null(field);
    if value.len() == field.len() {
        return Err(
            errors::Error::MalformedResponse(format!("devicemapper {what} is not null terminated"))
                .into(),
        );
    }
    if value.is_empty() {
        return Ok(None);
    }
    String::from_utf8(value.to_vec()).map(Some).map_err(|_| {
        errors::Error::MalformedResponse(format!("devicemapper {what} is not UTF-8")).into()
    })
}

impl TryFrom<&DmIoctl> for DeviceInfo {
    type Error = DmError;

    fn try_from(ioctl: &DmIoctl) -> DmResult<Self> {
        let name = id_field(&ioctl.name, "name")?
            .map(DmNameBuf::from_kernel)
            .transpose()?;
        let uuid = id_field(&ioctl.uuid, "UUID")?
            .map(DmUuidBuf::from_kernel)
            .transpose()?;
        Ok(DeviceInfo {
            version: Version::new(
                u64::from(ioctl.version[0]),
                u64::from(ioctl.version[1]),
                u64::from(ioctl.version[2]),
            ),
            data_size: ioctl.data_size,
            data_start: ioctl.data_start,
            target_count: ioctl.target_count,
            open_count: ioctl.open_count,
            flags: DmFlags::from_bits_truncate(ioctl.flags),
            event_nr: ioctl.event_nr,
            // dm_ioctl struct reserves 64 bits for device but kernel "huge"
            // encoding is only 32 bits.
            dev: Device::from_kdev_t(ioctl.dev as u32),
            uuid,
            name,
        })
    }
}

impl DeviceInfo {
    /// Parses a DM ioctl structure.
    ///
    /// Equivalent to `DeviceInfo::try_from(hdr)`.
    pub fn new(hdr: &DmIoctl) -> DmResult<Self> {
        DeviceInfo::try_from(hdr)
    }

    /// The major, minor, and patchlevel versions of devicemapper.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The size of the buffer the kernel used for its reply, header
    /// included.
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    /// The offset of the reply's payload from the start of the buffer.
    pub fn data_start(&self) -> u32 {
        self.data_start
    }

    /// The number of targets in the device's table.
    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    /// The number of times the device is currently open.
    pub fn open_count(&self) -> i32 {
        self.open_count
    }

    /// The last event number for the device.
    pub fn event_nr(&self) -> u32 {
        self.event_nr
    }

    /// The device's major and minor device numbers, as a Device.
    pub fn device(&self) -> Device {
        self.dev
    }

    /// The device's name.
    pub fn name(&self) -> Option<&DmName> {
        self.name.as_ref().map(|name| name.as_ref())
    }

    /// The device's devicemapper uuid.
    pub fn uuid(&self) -> Option<&DmUuid> {
        self.uuid.as_ref().map(|uuid| uuid.as_ref())
    }

    /// The flags returned from the device.
    pub fn flags(&self) -> DmFlags {
        self.flags
    }
}
