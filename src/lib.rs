// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Read-only queries of the running kernel's devicemapper.
//!
//! # Overview
//!
//! Linux's devicemapper builds virtual block devices out of one or more
//! "targets", each mapping a range of sectors onto underlying storage.
//! The kernel exposes the state of these devices through a single control
//! node, `/dev/mapper/control`, which accepts a family of ioctls.
//!
//! This crate speaks that ioctl protocol directly, without linking
//! libdevmapper. It can:
//!
//! * list the mapped devices known to the kernel, with their device numbers
//! * retrieve the table or status lines of a device's targets
//! * interpret the status line of a dm-cache target
//! * report the kernel's devicemapper version and loaded target types
//!
//! It never creates, reloads, or removes a mapping.
//!
//! # Usage
//!
//! ```no_run
//! use dmquery::{DevId, DmOptions, DM};
//!
//! let dm = DM::new().unwrap();
//! for entry in dm.list_devices().unwrap() {
//!     let (_, targets) = dm
//!         .table_status(&DevId::Name(&entry.name), &DmOptions::default())
//!         .unwrap();
//!     for target in targets.iter().filter(|t| t.target_type.to_string() == "cache") {
//!         println!("{}: {:?}", entry.name, target.cache_status());
//!     }
//! }
//! dm.close();
//! ```

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

/// Macros for validated string identifiers
#[macro_use]
mod id_macros;
/// Macros for numeric unit newtypes
#[macro_use]
mod range_macros;
/// dm-cache status parsing
mod cachedev;
/// shared constants
mod consts;
/// core lower level API
mod core;
/// return results container
mod result;
/// basic units (Sectors, DataBlocks, MetaBlocks)
mod units;

#[cfg(test)]
mod testing;

pub use crate::{
    cachedev::{
        CacheDevPerformance, CacheDevStatus, CacheDevUsage, CacheDevWorkingStatus,
        CACHE_TARGET_NAME,
    },
    consts::IEC,
    core::{
        devnode_to_devno, errors, ControlDevice, DevId, Device, DeviceInfo, DeviceListEntry,
        DmFlags, DmIoctl, DmName, DmNameBuf, DmOptions, DmUuid, DmUuidBuf, TargetStatus,
        TargetType, TargetTypeBuf, TargetVersion, Transport, DM,
    },
    result::{DmError, DmResult, ErrorEnum},
    units::{DataBlocks, MetaBlocks, Sectors, SECTOR_SIZE},
};
