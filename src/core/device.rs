// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fmt, path::Path, str::FromStr};

use nix::{
    libc::{dev_t, major, makedev, minor},
    sys::stat::{self, SFlag},
};

use crate::{
    core::errors,
    result::{DmError, DmResult},
};

/// A struct containing the device's major and minor numbers
///
/// Also allows conversion to/from a single 64bit dev_t value, and to/from
/// the 32 bit encoding devicemapper uses in its ioctl structures.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct Device {
    /// Device major number
    pub major: u32,
    /// Device minor number
    pub minor: u32,
}

/// Display format is the device number in "<major>:<minor>" format
impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl FromStr for Device {
    type Err = DmError;

    fn from_str(s: &str) -> Result<Device, DmError> {
        let (major, minor) = s.split_once(':').ok_or_else(|| {
            DmError::Core(errors::Error::InvalidArgument(format!(
                "value \"{s}\" is not in <major>:<minor> format"
            )))
        })?;
        let major = major.parse::<u32>().map_err(|_| {
            DmError::Core(errors::Error::InvalidArgument(format!(
                "could not parse \"{major}\" to obtain major number"
            )))
        })?;
        let minor = minor.parse::<u32>().map_err(|_| {
            DmError::Core(errors::Error::InvalidArgument(format!(
                "could not parse \"{minor}\" to obtain minor number"
            )))
        })?;
        Ok(Device { major, minor })
    }
}

impl From<dev_t> for Device {
    fn from(val: dev_t) -> Device {
        #[allow(unused_unsafe)]
        let (major, minor) = unsafe { (major(val), minor(val)) };
        Device { major, minor }
    }
}

impl From<Device> for dev_t {
    fn from(dev: Device) -> dev_t {
        #[allow(unused_unsafe)] // No longer unsafe in libc 0.2.133.
        unsafe {
            makedev(dev.major, dev.minor)
        }
    }
}

/// The Linux kernel's kdev_t encodes major/minor values as mmmM MMmm.
/// The low 8 bits of the minor are at the bottom, the 12 bits of the major
/// above them, and the remaining 12 bits of the minor at the top.
impl Device {
    /// Make a Device from a kdev_t.
    pub fn from_kdev_t(val: u32) -> Device {
        Device {
            major: (val & 0xf_ff00) >> 8,
            minor: (val & 0xff) | ((val >> 12) & 0xf_ff00),
        }
    }

    /// Convert to a kdev_t. Return None if values are not expressible as a
    /// kdev_t.
    pub fn to_kdev_t(self) -> Option<u32> {
        if self.major > 0xfff || self.minor > 0xf_ffff {
            return None;
        }

        Some((self.minor & 0xff) | (self.major << 8) | ((self.minor & !0xff) << 12))
    }
}

/// Get a device number from a device node.
/// Return None if the device is not a block device; devicemapper is not
/// interested in other sorts of devices. Return None if the device appears
/// not to exist.
pub fn devnode_to_devno(path: &Path) -> DmResult<Option<u64>> {
    match stat::stat(path) {
        Ok(metadata) => Ok(
            if metadata.st_mode & SFlag::S_IFMT.bits() == SFlag::S_IFBLK.bits() {
                Some(metadata.st_rdev)
            } else {
                None
            },
        ),
        Err(nix::Error::ENOENT) => Ok(None),
        Err(err) => Err(DmError::Core(errors::Error::MetadataIo(
            path.to_owned(),
            err.to_string(),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    /// Verify conversion is correct both ways
    fn test_dev_t_conversion() {
        let test_devt_1: dev_t = 0xabcd_ef12_3456_7890;

        let dev1 = Device::from(test_devt_1);
        // Default glibc dev_t encoding is MMMM Mmmm mmmM MMmm. I guess if
        // we're on a platform where non-default is used, we'll fail.
        assert_eq!(dev1.major, 0xabcd_e678);
        assert_eq!(dev1.minor, 0xf123_4590);

        let test_devt_2: dev_t = dev_t::from(dev1);
        assert_eq!(test_devt_1, test_devt_2);
    }

    #[test]
    /// A device-mapper device number taken from a live system.
    fn test_kdev_t_dm_device() {
        let dev = Device::from_kdev_t(2_162_142);
        assert_eq!(dev.major, 253);
        assert_eq!(dev.minor, 734);
        assert_eq!(dev.to_kdev_t(), Some(2_162_142));
    }

    #[test]
    /// Every kdev_t decomposes into a Device that recombines to the same
    /// value. Walk the space with a stride that touches every bit field.
    fn test_kdev_t_recombines() {
        let mut val: u32 = 0;
        loop {
            assert_eq!(Device::from_kdev_t(val).to_kdev_t(), Some(val));
            match val.checked_add(65_521) {
                Some(next) => val = next,
                None => break,
            }
        }
        for val in [0, 0xff, 0xf_ff00, 0xfff0_0000, u32::MAX] {
            assert_eq!(Device::from_kdev_t(val).to_kdev_t(), Some(val));
        }
    }

    #[test]
    /// Verify conversion is correct both ways
    fn test_kdev_t_conversion() {
        let test_devt_1: u32 = 0x1234_5678;

        let dev1 = Device::from_kdev_t(test_devt_1);
        // Default kernel kdev_t "huge" encoding is mmmM MMmm.
        assert_eq!(dev1.major, 0x456);
        assert_eq!(dev1.minor, 0x1_2378);

        let test_devt_2: u32 = dev1.to_kdev_t().unwrap();
        assert_eq!(test_devt_1, test_devt_2);

        // a Device inexpressible as a kdev_t
        let dev2 = Device::from(0xabcd_ef12_3456_7890);
        assert_eq!(dev2.to_kdev_t(), None);
    }

    #[test]
    /// Devices print and parse as major:minor.
    fn test_display_parse() {
        let dev = Device {
            major: 253,
            minor: 3,
        };
        assert_eq!(dev.to_string(), "253:3");
        assert_eq!("253:3".parse::<Device>().unwrap(), dev);
        assert_matches!(
            "253".parse::<Device>(),
            Err(DmError::Core(errors::Error::InvalidArgument(_)))
        );
        assert_matches!(
            "253:x".parse::<Device>(),
            Err(DmError::Core(errors::Error::InvalidArgument(_)))
        );
    }

    #[test]
    /// A missing node has no device number; a regular file is not a block
    /// device.
    fn test_devnode_to_devno() {
        let missing = PathBuf::from("/dev/this-node-does-not-exist-dmquery");
        assert_matches!(devnode_to_devno(&missing), Ok(None));
        assert_matches!(devnode_to_devno(Path::new("/proc/self/status")), Ok(None));
    }
}
