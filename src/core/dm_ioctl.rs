// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The devicemapper ioctl ABI, as defined in <linux/dm-ioctl.h>.
//!
//! Every structure the kernel exchanges is laid out in the host's native
//! byte order with natural alignment. This module is the only place that
//! knows the field offsets; everything else goes through `DmIoctl` or the
//! record layout constants below.

use std::fmt;

use crate::{
    core::{
        errors,
        util::{read_ne_bytes, read_ne_i32, read_ne_u32, read_ne_u64, slice_to_null},
    },
    result::DmResult,
};

/// Indicator to send IOCTL to DM
pub const DM_IOCTL: u8 = 0xfd;
/// Major version
pub const DM_VERSION_MAJOR: u32 = 4;
/// Minor version
pub const DM_VERSION_MINOR: u32 = 30;
/// Patch level
pub const DM_VERSION_PATCHLEVEL: u32 = 0;

/// Size of the name field, including the trailing \0
pub const DM_NAME_LEN: usize = 128;
/// Size of the uuid field, including the trailing \0
pub const DM_UUID_LEN: usize = 129;
/// Size of a target spec's type field, including the trailing \0
pub const DM_MAX_TYPE_NAME: usize = 16;
const DM_DATA_LEN: usize = 7;

pub const DM_VERSION_CMD: u8 = 0;
pub const DM_LIST_DEVICES_CMD: u8 = 2;
pub const DM_DEV_STATUS_CMD: u8 = 7;
pub const DM_TABLE_DEPS_CMD: u8 = 11;
pub const DM_TABLE_STATUS_CMD: u8 = 12;
pub const DM_LIST_VERSIONS_CMD: u8 = 13;

pub const DM_READONLY_FLAG: u32 = 1 << 0;
pub const DM_SUSPEND_FLAG: u32 = 1 << 1;
pub const DM_PERSISTENT_DEV_FLAG: u32 = 1 << 3;
pub const DM_STATUS_TABLE_FLAG: u32 = 1 << 4;
pub const DM_ACTIVE_PRESENT_FLAG: u32 = 1 << 5;
pub const DM_INACTIVE_PRESENT_FLAG: u32 = 1 << 6;
pub const DM_BUFFER_FULL_FLAG: u32 = 1 << 8;
pub const DM_SKIP_BDGET_FLAG: u32 = 1 << 9;
pub const DM_SKIP_LOCKFS_FLAG: u32 = 1 << 10;
pub const DM_NOFLUSH_FLAG: u32 = 1 << 11;
pub const DM_QUERY_INACTIVE_TABLE_FLAG: u32 = 1 << 12;
pub const DM_UEVENT_GENERATED_FLAG: u32 = 1 << 13;
pub const DM_UUID_FLAG: u32 = 1 << 14;
pub const DM_SECURE_DATA_FLAG: u32 = 1 << 15;
pub const DM_DATA_OUT_FLAG: u32 = 1 << 16;
pub const DM_DEFERRED_REMOVE: u32 = 1 << 17;
pub const DM_INTERNAL_SUSPEND_FLAG: u32 = 1 << 18;
pub const DM_IMA_MEASUREMENT_FLAG: u32 = 1 << 19;

// struct dm_ioctl
const VERSION_OFFSET: usize = 0;
const DATA_SIZE_OFFSET: usize = 12;
const DATA_START_OFFSET: usize = 16;
const TARGET_COUNT_OFFSET: usize = 20;
const OPEN_COUNT_OFFSET: usize = 24;
const FLAGS_OFFSET: usize = 28;
const EVENT_NR_OFFSET: usize = 32;
const PADDING_OFFSET: usize = 36;
const DEV_OFFSET: usize = 40;
const NAME_OFFSET: usize = 48;
const UUID_OFFSET: usize = NAME_OFFSET + DM_NAME_LEN;
const DATA_OFFSET: usize = UUID_OFFSET + DM_UUID_LEN;

/// Size in bytes of struct dm_ioctl.
pub const DM_IOCTL_SIZE: usize = 312;

const _: () = assert!(VERSION_OFFSET + 3 * 4 == DATA_SIZE_OFFSET);
const _: () = assert!(PADDING_OFFSET + 4 == DEV_OFFSET);
const _: () = assert!(DEV_OFFSET % 8 == 0);
const _: () = assert!(DEV_OFFSET + 8 == NAME_OFFSET);
const _: () = assert!(DATA_OFFSET + DM_DATA_LEN == DM_IOCTL_SIZE);
const _: () = assert!(DM_IOCTL_SIZE % 8 == 0);

// struct dm_name_list: __u64 dev; __u32 next; char name[];
pub const NAME_LIST_DEV_OFFSET: usize = 0;
pub const NAME_LIST_NEXT_OFFSET: usize = 8;
/// offsetof(struct dm_name_list, name)
pub const NAME_LIST_HEAD_SIZE: usize = 12;

// struct dm_target_spec:
// __u64 sector_start; __u64 length; __s32 status; __u32 next;
// char target_type[DM_MAX_TYPE_NAME];
pub const TARGET_SPEC_START_OFFSET: usize = 0;
pub const TARGET_SPEC_LENGTH_OFFSET: usize = 8;
pub const TARGET_SPEC_NEXT_OFFSET: usize = 20;
pub const TARGET_SPEC_TYPE_OFFSET: usize = 24;
/// sizeof(struct dm_target_spec)
pub const TARGET_SPEC_SIZE: usize = 40;

const _: () = assert!(TARGET_SPEC_TYPE_OFFSET + DM_MAX_TYPE_NAME == TARGET_SPEC_SIZE);

// struct dm_target_versions: __u32 next; __u32 version[3]; char name[];
pub const TARGET_VERSIONS_NEXT_OFFSET: usize = 0;
pub const TARGET_VERSIONS_VERSION_OFFSET: usize = 4;
/// offsetof(struct dm_target_versions, name)
pub const TARGET_VERSIONS_HEAD_SIZE: usize = 16;

// struct dm_target_deps: __u32 count; __u32 padding; __u64 dev[];
pub const TARGET_DEPS_COUNT_OFFSET: usize = 0;
/// offsetof(struct dm_target_deps, dev)
pub const TARGET_DEPS_HEAD_SIZE: usize = 8;

fn short_buffer(what: &str, needed: usize, found: usize) -> errors::Error {
    errors::Error::MalformedResponse(format!(
        "{what} needs {needed} bytes but only {found} are available"
    ))
}

/// The fixed header exchanged with the kernel on every devicemapper ioctl.
#[derive(Clone, PartialEq, Eq)]
pub struct DmIoctl {
    /// Interface version, major.minor.patchlevel
    pub version: [u32; 3],
    /// Total size of the buffer passed with the ioctl, header included
    pub data_size: u32,
    /// Offset from the start of the buffer to the payload
    pub data_start: u32,
    /// Number of targets in a table reply
    pub target_count: u32,
    /// Number of openers of the device
    pub open_count: i32,
    /// Flag word, see `DmFlags`
    pub flags: u32,
    /// Event sequence number, upper 16 bits carry a udev cookie
    pub event_nr: u32,
    pub padding: u32,
    /// Device number in the kernel's "huge" encoding
    pub dev: u64,
    pub name: [u8; DM_NAME_LEN],
    pub uuid: [u8; DM_UUID_LEN],
    pub data: [u8; DM_DATA_LEN],
}

impl Default for DmIoctl {
    fn default() -> DmIoctl {
        DmIoctl {
            version: [0; 3],
            data_size: 0,
            data_start: 0,
            target_count: 0,
            open_count: 0,
            flags: 0,
            event_nr: 0,
            padding: 0,
            dev: 0,
            name: [0; DM_NAME_LEN],
            uuid: [0; DM_UUID_LEN],
            data: [0; DM_DATA_LEN],
        }
    }
}

impl fmt::Debug for DmIoctl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmIoctl")
            .field("version", &self.version)
            .field("data_size", &self.data_size)
            .field("data_start", &self.data_start)
            .field("target_count", &self.target_count)
            .field("open_count", &self.open_count)
            .field("flags", &self.flags)
            .field("event_nr", &self.event_nr)
            .field("dev", &self.dev)
            .field("name", &String::from_utf8_lossy(slice_to_null(&self.name)))
            .field("uuid", &String::from_utf8_lossy(slice_to_null(&self.uuid)))
            .finish()
    }
}

impl DmIoctl {
    /// A header carrying this library's interface version, with the
    /// payload placed directly after the header.
    pub fn new() -> DmIoctl {
        DmIoctl {
            version: [DM_VERSION_MAJOR, DM_VERSION_MINOR, DM_VERSION_PATCHLEVEL],
            data_start: DM_IOCTL_SIZE as u32,
            ..Default::default()
        }
    }

    /// Write the header into the first DM_IOCTL_SIZE bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) -> DmResult<()> {
        let found = buf.len();
        let dest = buf
            .get_mut(..DM_IOCTL_SIZE)
            .ok_or_else(|| short_buffer("devicemapper ioctl header", DM_IOCTL_SIZE, found))?;

        for (i, v) in self.version.iter().enumerate() {
            dest[VERSION_OFFSET + 4 * i..VERSION_OFFSET + 4 * (i + 1)]
                .copy_from_slice(&v.to_ne_bytes());
        }
        dest[DATA_SIZE_OFFSET..DATA_START_OFFSET].copy_from_slice(&self.data_size.to_ne_bytes());
        dest[DATA_START_OFFSET..TARGET_COUNT_OFFSET]
            .copy_from_slice(&self.data_start.to_ne_bytes());
        dest[TARGET_COUNT_OFFSET..OPEN_COUNT_OFFSET]
            .copy_from_slice(&self.target_count.to_ne_bytes());
        dest[OPEN_COUNT_OFFSET..FLAGS_OFFSET].copy_from_slice(&self.open_count.to_ne_bytes());
        dest[FLAGS_OFFSET..EVENT_NR_OFFSET].copy_from_slice(&self.flags.to_ne_bytes());
        dest[EVENT_NR_OFFSET..PADDING_OFFSET].copy_from_slice(&self.event_nr.to_ne_bytes());
        dest[PADDING_OFFSET..DEV_OFFSET].copy_from_slice(&self.padding.to_ne_bytes());
        dest[DEV_OFFSET..NAME_OFFSET].copy_from_slice(&self.dev.to_ne_bytes());
        dest[NAME_OFFSET..UUID_OFFSET].copy_from_slice(&self.name);
        dest[UUID_OFFSET..DATA_OFFSET].copy_from_slice(&self.uuid);
        dest[DATA_OFFSET..DM_IOCTL_SIZE].copy_from_slice(&self.data);

        Ok(())
    }

    /// The header as a freestanding byte array.
    #[cfg(test)]
    pub fn to_bytes(&self) -> [u8; DM_IOCTL_SIZE] {
        let mut buf = [0u8; DM_IOCTL_SIZE];
        self.write_to(&mut buf)
            .expect("buffer is exactly DM_IOCTL_SIZE bytes");
        buf
    }

    /// Read a header from the front of `buf`.
    pub fn from_bytes(buf: &[u8]) -> DmResult<DmIoctl> {
        if buf.len() < DM_IOCTL_SIZE {
            return Err(short_buffer("devicemapper ioctl header", DM_IOCTL_SIZE, buf.len()).into());
        }

        // Bounds were checked above, every read below is in range.
        let u32_at = |offset| read_ne_u32(buf, offset).unwrap_or_default();

        Ok(DmIoctl {
            version: [
                u32_at(VERSION_OFFSET),
                u32_at(VERSION_OFFSET + 4),
                u32_at(VERSION_OFFSET + 8),
            ],
            data_size: u32_at(DATA_SIZE_OFFSET),
            data_start: u32_at(DATA_START_OFFSET),
            target_count: u32_at(TARGET_COUNT_OFFSET),
            open_count: read_ne_i32(buf, OPEN_COUNT_OFFSET).unwrap_or_default(),
            flags: u32_at(FLAGS_OFFSET),
            event_nr: u32_at(EVENT_NR_OFFSET),
            padding: u32_at(PADDING_OFFSET),
            dev: read_ne_u64(buf, DEV_OFFSET).unwrap_or_default(),
            name: read_ne_bytes(buf, NAME_OFFSET).unwrap_or([0; DM_NAME_LEN]),
            uuid: read_ne_bytes(buf, UUID_OFFSET).unwrap_or([0; DM_UUID_LEN]),
            data: read_ne_bytes(buf, DATA_OFFSET).unwrap_or_default(),
        })
    }

    /// The payload region of a reply buffer that began with this header.
    ///
    /// The kernel sets data_size to the number of bytes it actually used,
    /// header included.
    pub fn payload<'a>(&self, buf: &'a [u8]) -> DmResult<&'a [u8]> {
        let start = self.data_start as usize;
        let end = std::cmp::max(self.data_start, self.data_size) as usize;
        buf.get(start..end).ok_or_else(|| {
            errors::Error::MalformedResponse(format!(
                "payload region {start}..{end} exceeds response buffer of {} bytes",
                buf.len()
            ))
            .into()
        })
    }

    /// Copy `name` into the name field. The caller guarantees `name` fits
    /// with its trailing \0.
    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0; DM_NAME_LEN];
        self.name[..name.len()].copy_from_slice(name);
    }

    /// Copy `uuid` into the uuid field. The caller guarantees `uuid` fits
    /// with its trailing \0.
    pub fn set_uuid(&mut self, uuid: &[u8]) {
        self.uuid = [0; DM_UUID_LEN];
        self.uuid[..uuid.len()].copy_from_slice(uuid);
    }
}
