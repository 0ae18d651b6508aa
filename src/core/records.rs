// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Decoding of the variable-length records the kernel places in the
//! payload of a reply.
//!
//! Device lists, target tables, and target version lists all share one
//! shape: a fixed head containing an offset to the next record, followed
//! by a \0-terminated string that fills out the rest of the record. They
//! differ only in the head's size, in what the offset is measured from,
//! and in how the end of the chain is found.

use semver::Version;

use crate::{
    core::{
        device::Device,
        dm_ioctl::{
            NAME_LIST_DEV_OFFSET, NAME_LIST_HEAD_SIZE, NAME_LIST_NEXT_OFFSET,
            TARGET_DEPS_COUNT_OFFSET, TARGET_DEPS_HEAD_SIZE, TARGET_SPEC_LENGTH_OFFSET,
            TARGET_SPEC_NEXT_OFFSET, TARGET_SPEC_SIZE, TARGET_SPEC_START_OFFSET,
            TARGET_SPEC_TYPE_OFFSET, TARGET_VERSIONS_HEAD_SIZE, TARGET_VERSIONS_NEXT_OFFSET,
            TARGET_VERSIONS_VERSION_OFFSET,
        },
        errors,
        types::{DmNameBuf, TargetTypeBuf},
        util::{align_to, read_ne_u32, read_ne_u64, slice_to_null},
    },
    result::DmResult,
    units::Sectors,
};

/// The first interface minor version that appends each device's event
/// number to its entry in a device list.
const NAME_LIST_EVENT_NR_MINOR: u64 = 37;

/// What a record's offset-to-next is measured from.
#[derive(Clone, Copy, Debug)]
pub enum NextBase {
    /// The start of the record that holds the offset.
    Record,
    /// The start of the payload.
    Payload,
}

/// How the walk knows it has seen the last record.
#[derive(Clone, Copy, Debug)]
pub enum Terminator {
    /// The last record has an offset-to-next of zero.
    ZeroNext,
    /// Exactly this many records are present.
    Count(u32),
}

/// The layout of one family of linked records.
#[derive(Clone, Copy, Debug)]
pub struct RecordLayout {
    /// Size of the fixed head
    pub head_size: usize,
    /// Offset of the u32 offset-to-next field within the head
    pub next_offset: usize,
    pub base: NextBase,
}

/// One record in a chain: its fixed head followed by the variable-length
/// trailer that runs up to the next record.
#[derive(Debug, PartialEq, Eq)]
pub struct LinkedRecord<'a> {
    bytes: &'a [u8],
    head_size: usize,
}

impl<'a> LinkedRecord<'a> {
    /// The record's fixed head.
    pub fn head(&self) -> &'a [u8] {
        &self.bytes[..self.head_size]
    }

    /// Everything after the head.
    pub fn trailer(&self) -> &'a [u8] {
        &self.bytes[self.head_size..]
    }

    /// The whole record, head included.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

fn malformed(msg: String) -> errors::Error {
    errors::Error::MalformedResponse(msg)
}

/// Walk a chain of linked records in `payload`.
///
/// Every record must start with a complete head. A record's trailer runs to
/// the start of the next record; the last record's trailer runs to the end
/// of the payload. A final offset-to-next that points past the end of the
/// payload is clamped, since the kernel aligns it without counting the
/// padding in the payload size.
pub fn walk_records<'a>(
    payload: &'a [u8],
    layout: RecordLayout,
    terminator: Terminator,
) -> DmResult<Vec<LinkedRecord<'a>>> {
    let mut records = Vec::new();
    let mut start = 0usize;

    loop {
        if let Terminator::Count(count) = terminator {
            if records.len() == count as usize {
                break;
            }
        }

        let head = payload
            .get(start..start + layout.head_size)
            .ok_or_else(|| {
                malformed(format!(
                    "record {} at offset {start} needs a {} byte head but payload is {} bytes",
                    records.len(),
                    layout.head_size,
                    payload.len()
                ))
            })?;
        let next = read_ne_u32(head, layout.next_offset).ok_or_else(|| {
            malformed(format!(
                "offset-to-next field at {} lies outside {} byte head",
                layout.next_offset, layout.head_size
            ))
        })? as usize;

        let end = if next == 0 {
            payload.len()
        } else {
            let end = match layout.base {
                NextBase::Record => start + next,
                NextBase::Payload => next,
            };
            if end < start + layout.head_size {
                return Err(malformed(format!(
                    "record {} at offset {start} has offset-to-next {next} that overlaps its own head",
                    records.len()
                ))
                .into());
            }
            end.min(payload.len())
        };

        records.push(LinkedRecord {
            bytes: &payload[start..end],
            head_size: layout.head_size,
        });

        match terminator {
            Terminator::ZeroNext if next == 0 => break,
            Terminator::Count(_) if next == 0 || end == payload.len() => {
                // Nothing can follow; a count larger than what was walked is
                // caught by the head check on the next pass.
                start = payload.len();
            }
            _ => start = end,
        }
    }

    Ok(records)
}

/// One entry in the kernel's list of devices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceListEntry {
    /// The device's name
    pub name: DmNameBuf,
    /// The device's major and minor numbers
    pub device: Device,
    /// The device's last event number, if the kernel reports it
    pub event_nr: Option<u32>,
}

/// Decode the payload of a DM_LIST_DEVICES reply.
///
/// `version` is the interface version the kernel reported in its reply
/// header; it decides whether event numbers follow the names.
pub fn parse_device_list(payload: &[u8], version: &Version) -> DmResult<Vec<DeviceListEntry>> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    // The kernel writes a zero device number to flag an empty list.
    match read_ne_u64(payload, NAME_LIST_DEV_OFFSET) {
        None => {
            return Err(malformed(format!(
                "device list needs at least 8 bytes but payload is {} bytes",
                payload.len()
            ))
            .into())
        }
        Some(0) => return Ok(Vec::new()),
        Some(_) => {}
    }

    let layout = RecordLayout {
        head_size: NAME_LIST_HEAD_SIZE,
        next_offset: NAME_LIST_NEXT_OFFSET,
        base: NextBase::Record,
    };

    walk_records(payload, layout, Terminator::ZeroNext)?
        .iter()
        .map(|record| -> DmResult<DeviceListEntry> {
            let dev = read_ne_u64(record.head(), NAME_LIST_DEV_OFFSET).unwrap_or_default();
            let name = slice_to_null(record.trailer());
            let name = String::from_utf8(name.to_vec())
                .map_err(|_| malformed("device name in device list is not UTF-8".into()))?;
            let name = DmNameBuf::from_kernel(name)
                .map_err(|err| malformed(format!("bad device name in device list: {err}")))?;

            // Should match offset calc in kernel's
            // drivers/md/dm-ioctl.c:list_devices
            let event_nr = if version.major == 4 && version.minor >= NAME_LIST_EVENT_NR_MINOR {
                let offset = align_to(NAME_LIST_HEAD_SIZE + name.as_bytes().len() + 1, 8);
                read_ne_u32(record.bytes(), offset)
            } else {
                None
            };

            Ok(DeviceListEntry {
                name,
                // dm_name_list reserves 64 bits for the device but kernel
                // "huge" encoding is only 32 bits.
                device: Device::from_kdev_t(dev as u32),
                event_nr,
            })
        })
        .collect()
}

/// One line of a device's table, or of its status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetStatus {
    /// The first sector the target maps
    pub start: Sectors,
    /// The number of sectors the target maps
    pub length: Sectors,
    /// The target's type
    pub target_type: TargetTypeBuf,
    /// The target's parameters or status, depending on the query. The
    /// grammar is specific to the target type.
    pub params: String,
}

/// Decode the payload of a DM_TABLE_STATUS reply holding `count` targets.
///
/// Trims trailing white space off each params string. This
/// canonicalization makes checking identity of tables easier.
pub fn parse_table_status(count: u32, payload: &[u8]) -> DmResult<Vec<TargetStatus>> {
    let layout = RecordLayout {
        head_size: TARGET_SPEC_SIZE,
        next_offset: TARGET_SPEC_NEXT_OFFSET,
        base: NextBase::Payload,
    };

    walk_records(payload, layout, Terminator::Count(count))?
        .iter()
        .map(|record| -> DmResult<TargetStatus> {
            let head = record.head();
            let start = read_ne_u64(head, TARGET_SPEC_START_OFFSET).unwrap_or_default();
            let length = read_ne_u64(head, TARGET_SPEC_LENGTH_OFFSET).unwrap_or_default();

            let target_type = slice_to_null(&head[TARGET_SPEC_TYPE_OFFSET..]);
            let target_type = TargetTypeBuf::from_kernel(
                String::from_utf8_lossy(target_type).trim_end().to_owned(),
            )
            .map_err(|err| malformed(format!("bad target type in table: {err}")))?;

            let params = String::from_utf8_lossy(slice_to_null(record.trailer()))
                .trim_end()
                .to_owned();

            Ok(TargetStatus {
                start: Sectors(start),
                length: Sectors(length),
                target_type,
                params,
            })
        })
        .collect()
}

/// A target type loaded in the kernel, with its version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetVersion {
    /// The target type's name
    pub name: String,
    /// The target type's major, minor, and patchlevel versions
    pub version: Version,
}

/// Decode the payload of a DM_LIST_VERSIONS reply.
///
/// Every kernel has at least one target type loaded, so even an empty
/// payload is malformed.
pub fn parse_target_versions(payload: &[u8]) -> DmResult<Vec<TargetVersion>> {
    let layout = RecordLayout {
        head_size: TARGET_VERSIONS_HEAD_SIZE,
        next_offset: TARGET_VERSIONS_NEXT_OFFSET,
        base: NextBase::Record,
    };

    Ok(walk_records(payload, layout, Terminator::ZeroNext)?
        .iter()
        .map(|record| {
            let v = |i: usize| {
                u64::from(
                    read_ne_u32(record.head(), TARGET_VERSIONS_VERSION_OFFSET + 4 * i)
                        .unwrap_or_default(),
                )
            };
            TargetVersion {
                name: String::from_utf8_lossy(slice_to_null(record.trailer())).into_owned(),
                version: Version::new(v(0), v(1), v(2)),
            }
        })
        .collect())
}

/// Decode the payload of a DM_TABLE_DEPS reply.
///
/// The kernel always writes the count, so a payload too short to hold it
/// is malformed.
pub fn parse_table_deps(payload: &[u8]) -> DmResult<Vec<Device>> {
    if payload.len() < TARGET_DEPS_HEAD_SIZE {
        return Err(malformed(format!(
            "deps list needs a {TARGET_DEPS_HEAD_SIZE} byte head but payload is {} bytes",
            payload.len()
        ))
        .into());
    }

    let count = read_ne_u32(payload, TARGET_DEPS_COUNT_OFFSET).unwrap_or_default() as usize;

    (0..count)
        .map(|i| -> DmResult<Device> {
            // The DM target_deps struct reserves 64 bits for each entry
            // but only 32 bits is used by kernel "huge" dev_t encoding.
            read_ne_u64(payload, TARGET_DEPS_HEAD_SIZE + 8 * i)
                .map(|dev| Device::from_kdev_t(dev as u32))
                .ok_or_else(|| {
                    malformed(format!(
                        "deps list claims {count} devices but payload holds only {} bytes",
                        payload.len()
                    ))
                    .into()
                })
        })
        .collect()
}
