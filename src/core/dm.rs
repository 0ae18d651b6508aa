// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fs::File, path::Path};

use log::{debug, trace};
use semver::Version;

use crate::{
    consts::{DM_CTL_PATH, MAX_BUF_SIZE, MIN_BUF_SIZE},
    core::{
        device::Device,
        deviceinfo::DeviceInfo,
        dm_flags::DmFlags,
        dm_ioctl::{
            DmIoctl, DM_DEV_STATUS_CMD, DM_LIST_DEVICES_CMD, DM_LIST_VERSIONS_CMD,
            DM_TABLE_DEPS_CMD, DM_TABLE_STATUS_CMD, DM_VERSION_CMD,
        },
        dm_options::DmOptions,
        errors,
        records::{
            parse_device_list, parse_table_deps, parse_table_status, parse_target_versions,
            DeviceListEntry, TargetStatus, TargetVersion,
        },
        transport::{ControlDevice, Transport},
        types::DevId,
    },
    result::DmResult,
};

/// Context needed for communicating with devicemapper.
///
/// Every call builds its own request buffer, so a single context may be
/// shared by reference. Nothing is cached between calls.
#[derive(Debug)]
pub struct DM<T = ControlDevice> {
    transport: T,
}

impl DM {
    /// Create a new context for communicating with DM.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> DmResult<DM> {
        DM::open(Path::new(DM_CTL_PATH))
    }

    /// Create a context on the control node at `path`.
    pub fn open(path: &Path) -> DmResult<DM> {
        let transport = ControlDevice::open(path)?;
        debug!("opened devicemapper control node {}", path.display());
        Ok(DM { transport })
    }

    /// Get the file within the DM context, likely for polling purposes.
    pub fn file(&self) -> &File {
        self.transport.file()
    }

    /// Release the control node. The context cannot be used afterward.
    pub fn close(self) {
        self.transport.close();
        debug!("closed devicemapper control node");
    }
}

impl<T: Transport> DM<T> {
    /// Create a context that issues its ioctls through `transport`.
    pub fn with_transport(transport: T) -> DM<T> {
        DM { transport }
    }

    /// The transport this context issues its ioctls through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // Send the header with a zeroed reply area behind it. Handles the
    // BUFFER_FULL flag by doubling the buffer, up to MAX_BUF_SIZE.
    // Returns the kernel's reply header along with the whole buffer.
    fn do_ioctl(&self, ioctl: u8, hdr: &DmIoctl) -> DmResult<(DmIoctl, Vec<u8>)> {
        let mut size = MIN_BUF_SIZE;
        loop {
            let mut hdr_in = hdr.clone();
            hdr_in.data_size = size as u32;

            let mut buf = vec![0u8; size];
            hdr_in.write_to(&mut buf)?;

            trace!("devicemapper ioctl {ioctl} with a {size} byte buffer: {hdr_in:?}");
            if let Err(err) = self.transport.ioctl(ioctl, &mut buf) {
                debug!("devicemapper ioctl {ioctl} failed: {err}");
                let info = DeviceInfo::new(&hdr_in).ok().map(Box::new);
                return Err(errors::Error::Ioctl(ioctl, info, Box::new(err)).into());
            }

            let hdr_out = DmIoctl::from_bytes(&buf)?;

            // If DM was able to write the requested data into the provided
            // buffer, the reply is complete.
            if hdr_out.flags & DmFlags::DM_BUFFER_FULL.bits() == 0 {
                trace!("devicemapper ioctl {ioctl} reply: {hdr_out:?}");
                return Ok((hdr_out, buf));
            }

            if size >= MAX_BUF_SIZE {
                return Err(errors::Error::IoctlResultTooLarge(MAX_BUF_SIZE).into());
            }
            size *= 2;
            debug!("devicemapper ioctl {ioctl} needs more room, retrying with {size} bytes");
        }
    }

    /// Devicemapper version information: Major, Minor, and patchlevel versions.
    pub fn version(&self) -> DmResult<(u32, u32, u32)> {
        let hdr = DmOptions::default().to_ioctl_hdr(None, DmFlags::empty());

        let (hdr, _) = self.do_ioctl(DM_VERSION_CMD, &hdr)?;

        Ok((hdr.version[0], hdr.version[1], hdr.version[2]))
    }

    /// Returns the DM devices known to the kernel: each device's name, its
    /// major and minor device numbers, and on kernels that support it,
    /// its last event_nr.
    pub fn list_devices(&self) -> DmResult<Vec<DeviceListEntry>> {
        let hdr = DmOptions::default().to_ioctl_hdr(None, DmFlags::empty());

        let (hdr, buf) = self.do_ioctl(DM_LIST_DEVICES_CMD, &hdr)?;

        let version = Version::new(
            u64::from(hdr.version[0]),
            u64::from(hdr.version[1]),
            u64::from(hdr.version[2]),
        );
        parse_device_list(hdr.payload(&buf)?, &version)
    }

    /// Get DeviceInfo for a device. This is also returned by other
    /// methods, but if just the DeviceInfo is desired then this just
    /// gets it.
    pub fn device_info(&self, id: &DevId<'_>) -> DmResult<DeviceInfo> {
        let hdr = DmOptions::default().to_ioctl_hdr(Some(id), DmFlags::empty());

        let (hdr, _) = self.do_ioctl(DM_DEV_STATUS_CMD, &hdr)?;

        DeviceInfo::new(&hdr)
    }

    /// Return a list of all devices this device depends on, that is, the
    /// devices its table's targets are layered over.
    ///
    /// If DM_QUERY_INACTIVE_TABLE is set, instead return for the
    /// inactive table.
    ///
    /// Valid flags: DM_QUERY_INACTIVE_TABLE
    pub fn table_deps(&self, id: &DevId<'_>, options: &DmOptions) -> DmResult<Vec<Device>> {
        let hdr = options.to_ioctl_hdr(Some(id), DmFlags::DM_QUERY_INACTIVE_TABLE);

        let (hdr, buf) = self.do_ioctl(DM_TABLE_DEPS_CMD, &hdr)?;

        parse_table_deps(hdr.payload(&buf)?)
    }

    /// Return the status of all targets for a device's "active"
    /// table.
    ///
    /// Returns DeviceInfo and a Vec with one entry per target.
    ///
    /// If DM_STATUS_TABLE flag is set, returns the current table value. Otherwise
    /// returns target-specific status information.
    ///
    /// If DM_NOFLUSH is set, retrieving the target-specific status information for
    /// targets with metadata will not cause a metadata write.
    ///
    /// If DM_QUERY_INACTIVE_TABLE is set, instead return the status of the
    /// inactive table.
    ///
    /// Valid flags: DM_NOFLUSH, DM_STATUS_TABLE, DM_QUERY_INACTIVE_TABLE
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dmquery::{DM, DevId, DmFlags, DmOptions, DmName};
    /// let dm = DM::new().unwrap();
    ///
    /// let name = DmName::new("example-dev").expect("is valid DM name");
    /// let id = DevId::Name(name);
    /// let res = dm.table_status(&id,
    ///                           &DmOptions::default().set_flags(DmFlags::DM_STATUS_TABLE)).unwrap();
    /// println!("{:?} {:?}", res.0.name(), res.1);
    /// ```
    pub fn table_status(
        &self,
        id: &DevId<'_>,
        options: &DmOptions,
    ) -> DmResult<(DeviceInfo, Vec<TargetStatus>)> {
        let hdr = options.to_ioctl_hdr(
            Some(id),
            DmFlags::DM_NOFLUSH | DmFlags::DM_STATUS_TABLE | DmFlags::DM_QUERY_INACTIVE_TABLE,
        );

        let (hdr, buf) = self.do_ioctl(DM_TABLE_STATUS_CMD, &hdr)?;

        let status = parse_table_status(hdr.target_count, hdr.payload(&buf)?)?;

        Ok((DeviceInfo::new(&hdr)?, status))
    }

    /// Returns a list of each loaded target type with its name and
    /// version.
    pub fn list_versions(&self) -> DmResult<Vec<TargetVersion>> {
        let hdr = DmOptions::default().to_ioctl_hdr(None, DmFlags::empty());

        let (hdr, buf) = self.do_ioctl(DM_LIST_VERSIONS_CMD, &hdr)?;

        parse_target_versions(hdr.payload(&buf)?)
    }
}

#[cfg(test)]
mod tests {
    use nix::errno::Errno;

    use crate::{
        core::{
            dm_ioctl::{DM_NOFLUSH_FLAG, DM_QUERY_INACTIVE_TABLE_FLAG},
            errors::Error,
            types::{DmName, DmNameBuf},
        },
        result::DmError,
        testing::{deps_list, init_logger, name_list, target_list, versions_list, FakeKernel, Reply},
        units::Sectors,
    };

    use super::*;

    fn dev(major: u32, minor: u32) -> Device {
        Device { major, minor }
    }

    #[test]
    /// The version reported is the kernel's, not the one sent.
    fn test_version() {
        init_logger();
        let dm = DM::with_transport(
            FakeKernel::new()
                .with_version([4, 47, 0])
                .reply(DM_VERSION_CMD, Reply::default()),
        );
        assert_eq!(dm.version().unwrap(), (4, 47, 0));

        let calls = dm.transport().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cmd, DM_VERSION_CMD);
        assert_eq!(calls[0].hdr.version, [4, 30, 0]);
        assert_eq!(calls[0].buf_size, MIN_BUF_SIZE);
    }

    #[test]
    /// A reply larger than the first buffer is fetched by doubling.
    fn test_buffer_growth() {
        init_logger();
        let names = (0..100)
            .map(|i| format!("vg0-lv{i:03}"))
            .collect::<Vec<_>>();
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, name)| (dev(253, i as u32), name.as_str(), Some(i as u32)))
            .collect::<Vec<_>>();
        let payload = name_list(&entries);
        assert!(payload.len() > 2 * MIN_BUF_SIZE);

        let dm = DM::with_transport(
            FakeKernel::new().reply(DM_LIST_DEVICES_CMD, Reply::payload(payload)),
        );
        let devices = dm.list_devices().unwrap();
        assert_eq!(devices.len(), 100);
        assert_eq!(devices[42].name.to_string(), "vg0-lv042");
        assert_eq!(devices[42].device, dev(253, 42));
        assert_eq!(devices[42].event_nr, Some(42));

        let sizes = dm
            .transport()
            .calls()
            .iter()
            .map(|call| call.buf_size)
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![MIN_BUF_SIZE, 2 * MIN_BUF_SIZE, 4 * MIN_BUF_SIZE]);
    }

    #[test]
    /// A kernel that never has room is given up on at the largest buffer.
    fn test_buffer_exhausted() {
        init_logger();
        let dm = DM::with_transport(FakeKernel::new().reply(
            DM_LIST_DEVICES_CMD,
            Reply {
                always_full: true,
                ..Default::default()
            },
        ));
        assert_matches!(
            dm.list_devices(),
            Err(DmError::Core(Error::IoctlResultTooLarge(size))) if size == MAX_BUF_SIZE
        );

        let sizes = dm
            .transport()
            .calls()
            .iter()
            .map(|call| call.buf_size)
            .collect::<Vec<_>>();
        assert_eq!(sizes.len(), 7);
        assert_eq!(sizes.first(), Some(&MIN_BUF_SIZE));
        assert_eq!(sizes.last(), Some(&MAX_BUF_SIZE));
    }

    #[test]
    /// A failed ioctl reports the command and the header that was sent.
    fn test_ioctl_error() {
        init_logger();
        let dm = DM::with_transport(FakeKernel::new().fail(DM_DEV_STATUS_CMD, Errno::ENXIO));
        let name = DmName::new("junk").expect("is valid DM name");
        match dm.device_info(&DevId::Name(name)) {
            Err(DmError::Core(Error::Ioctl(cmd, Some(info), err))) => {
                assert_eq!(cmd, DM_DEV_STATUS_CMD);
                assert_eq!(info.name(), Some(name));
                assert_eq!(*err, Errno::ENXIO);
            }
            res => panic!("expected an ioctl error, got {res:?}"),
        }
        assert_eq!(dm.transport().calls().len(), 1);
    }

    #[test]
    /// Only the flags a query accepts are passed to the kernel, and the
    /// reply's targets and header are both returned.
    fn test_table_status() {
        init_logger();
        let payload = target_list(&[
            (0, 2_097_152, "cache", "8 13/5120 512 322/3212 193 63 423 0 0 322 0 1 writeback 2 migration_threshold 2048 smq 0 rw - "),
            (2_097_152, 1024, "linear", "8:16 2048"),
        ]);
        let dm = DM::with_transport(FakeKernel::new().reply(
            DM_TABLE_STATUS_CMD,
            Reply {
                payload,
                target_count: 2,
                ..Default::default()
            },
        ));

        let name = DmNameBuf::new("vg0-cached".into()).expect("is valid DM name");
        let options = DmOptions::default()
            .set_flags(DmFlags::DM_NOFLUSH | DmFlags::DM_SUSPEND | DmFlags::DM_READONLY);
        let (info, targets) = dm.table_status(&DevId::Name(&name), &options).unwrap();

        assert_eq!(info.name(), Some(&*name));
        assert_eq!(info.target_count(), 2);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].target_type.to_string(), "cache");
        assert_eq!(targets[0].length, Sectors(2_097_152));
        assert!(targets[0].params.ends_with("rw -"));
        assert_matches!(
            targets[0].cache_status(),
            Ok(crate::cachedev::CacheDevStatus::Working(_))
        );
        assert_eq!(targets[1].target_type.to_string(), "linear");
        assert_eq!(targets[1].start, Sectors(2_097_152));
        assert_eq!(targets[1].params, "8:16 2048");

        let calls = dm.transport().calls();
        assert_eq!(calls[0].hdr.flags, DM_NOFLUSH_FLAG);
    }

    #[test]
    /// A device with no table reports no targets.
    fn test_table_status_no_table() {
        let dm = DM::with_transport(
            FakeKernel::new().reply(DM_TABLE_STATUS_CMD, Reply::default()),
        );
        let (_, targets) = dm
            .table_status(&DevId::Device(dev(253, 0)), &DmOptions::default())
            .unwrap();
        assert!(targets.is_empty());
        assert_eq!(dm.transport().calls()[0].hdr.dev, 253 << 8);
    }

    #[test]
    /// Dependencies and target versions pass through their decoders.
    fn test_deps_and_versions() {
        let dm = DM::with_transport(
            FakeKernel::new()
                .reply(
                    DM_TABLE_DEPS_CMD,
                    Reply::payload(deps_list(&[dev(8, 16), dev(8, 32)])),
                )
                .reply(
                    DM_LIST_VERSIONS_CMD,
                    Reply::payload(versions_list(&[("cache", [2, 2, 0]), ("linear", [1, 4, 0])])),
                ),
        );
        let name = DmName::new("vg0-cached").expect("is valid DM name");
        assert_eq!(
            dm.table_deps(
                &DevId::Name(name),
                &DmOptions::default().set_flags(DmFlags::DM_QUERY_INACTIVE_TABLE)
            )
            .unwrap(),
            vec![dev(8, 16), dev(8, 32)]
        );
        assert_eq!(
            dm.transport().calls()[0].hdr.flags,
            DM_QUERY_INACTIVE_TABLE_FLAG
        );

        let versions = dm.list_versions().unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].name, "cache");
        assert_eq!(versions[0].version, Version::new(2, 2, 0));
    }

    #[test]
    /// An empty device list is not an error.
    fn test_list_devices_empty() {
        let dm = DM::with_transport(
            FakeKernel::new().reply(DM_LIST_DEVICES_CMD, Reply::payload(vec![0u8; 16])),
        );
        assert!(dm.list_devices().unwrap().is_empty());
    }

    #[test]
    #[ignore = "needs root and a devicemapper control node"]
    /// Test that some version can be obtained.
    fn sudo_test_version() {
        assert_matches!(DM::new().unwrap().version(), Ok(_));
    }

    #[test]
    #[ignore = "needs root and a devicemapper control node"]
    /// Test that versions for some targets can be obtained.
    fn sudo_test_versions() {
        assert!(!DM::new().unwrap().list_versions().unwrap().is_empty());
    }

    #[test]
    #[ignore = "needs root and a devicemapper control node"]
    /// Every listed device can be queried by name and by number.
    fn sudo_test_list_devices() {
        let dm = DM::new().unwrap();
        for entry in dm.list_devices().unwrap() {
            let info = dm.device_info(&DevId::Name(&entry.name)).unwrap();
            assert_eq!(info.device(), entry.device);
            let (_, targets) = dm
                .table_status(&DevId::Device(entry.device), &DmOptions::default())
                .unwrap();
            assert_eq!(targets.len(), info.target_count() as usize);
        }
        dm.close();
    }

    #[test]
    #[ignore = "needs root and a devicemapper control node"]
    /// Verify that getting the status of a non-existent device specified
    /// by name returns an error.
    fn sudo_status_no_name() {
        let name = DmName::new("dmquery-no-such-device").expect("is valid DM name");
        assert_matches!(
            DM::new().unwrap().device_info(&DevId::Name(name)),
            Err(DmError::Core(Error::Ioctl(_, _, _)))
        );
    }
}
