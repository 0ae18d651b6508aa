// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;

use crate::{
    core::{
        device::Device,
        dm_ioctl::{DM_MAX_TYPE_NAME, DM_NAME_LEN, DM_UUID_LEN},
        errors,
    },
    result::DmError,
};

/// An error function to construct an error when creating a new string id.
fn err_func(err_msg: &str) -> DmError {
    DmError::Core(errors::Error::InvalidArgument(err_msg.into()))
}

// A devicemapper name. Really just a string, but also the argument type of
// DevId::Name. Used in function arguments to indicate that the function
// takes only a name, not a devicemapper uuid.
str_id!(DmName, DmNameBuf, DM_NAME_LEN, err_func);

// A devicemapper uuid. A devicemapper uuid has a devicemapper-specific
// format.
str_id!(DmUuid, DmUuidBuf, DM_UUID_LEN, err_func);

// The name of a target type, e.g., "linear" or "cache".
str_id!(TargetType, TargetTypeBuf, DM_MAX_TYPE_NAME, err_func);

/// Used as a parameter for functions that address a single device.
/// The kernel resolves the device by uuid, by name, or by device number.
#[derive(Debug, PartialEq, Eq)]
pub enum DevId<'a> {
    /// The parameter is the device's name
    Name(&'a DmName),
    /// The parameter is the device's devicemapper uuid
    Uuid(&'a DmUuid),
    /// The parameter is the device's major and minor numbers
    Device(Device),
}

impl<'a> fmt::Display for DevId<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DevId::Name(name) => write!(f, "{name}"),
            DevId::Uuid(uuid) => write!(f, "{uuid}"),
            DevId::Device(dev) => write!(f, "{dev}"),
        }
    }
}
