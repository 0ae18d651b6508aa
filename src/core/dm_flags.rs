// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use bitflags::bitflags;

use crate::core::dm_ioctl as dmi;

bitflags! {
    /// Flags used by devicemapper.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DmFlags: u32 {
        /// In: Device should be read-only.
        /// Out: Device is read-only.
        const DM_READONLY             = dmi::DM_READONLY_FLAG;
        /// In: Device should be suspended.
        /// Out: Device is suspended.
        const DM_SUSPEND              = dmi::DM_SUSPEND_FLAG;
        /// In: Use passed-in minor number.
        const DM_PERSISTENT_DEV       = dmi::DM_PERSISTENT_DEV_FLAG;
        /// In: STATUS command returns table info instead of status.
        const DM_STATUS_TABLE         = dmi::DM_STATUS_TABLE_FLAG;
        /// Out: Active table is present.
        const DM_ACTIVE_PRESENT       = dmi::DM_ACTIVE_PRESENT_FLAG;
        /// Out: Inactive table is present.
        const DM_INACTIVE_PRESENT     = dmi::DM_INACTIVE_PRESENT_FLAG;
        /// Out: Passed-in buffer was too small.
        const DM_BUFFER_FULL          = dmi::DM_BUFFER_FULL_FLAG;
        /// Obsolete.
        const DM_SKIP_BDGET           = dmi::DM_SKIP_BDGET_FLAG;
        /// In: Avoid freezing filesystem when suspending.
        const DM_SKIP_LOCKFS          = dmi::DM_SKIP_LOCKFS_FLAG;
        /// In: Suspend without flushing queued I/Os.
        /// In: Status requests do not cause a metadata commit.
        const DM_NOFLUSH              = dmi::DM_NOFLUSH_FLAG;
        /// In: Query inactive table instead of active.
        const DM_QUERY_INACTIVE_TABLE = dmi::DM_QUERY_INACTIVE_TABLE_FLAG;
        /// Out: A uevent was generated, the caller may need to wait for it.
        const DM_UEVENT_GENERATED     = dmi::DM_UEVENT_GENERATED_FLAG;
        /// In: Rename affects UUID field, not name field.
        const DM_UUID                 = dmi::DM_UUID_FLAG;
        /// In: All buffers are wiped after use. Use when handling crypto keys.
        const DM_SECURE_DATA          = dmi::DM_SECURE_DATA_FLAG;
        /// Out: A message generated output data.
        const DM_DATA_OUT             = dmi::DM_DATA_OUT_FLAG;
        /// In: Do not remove in-use devices.
        /// Out: Device scheduled to be removed when closed.
        const DM_DEFERRED_REMOVE      = dmi::DM_DEFERRED_REMOVE;
        /// Out: Device is suspended internally.
        const DM_INTERNAL_SUSPEND     = dmi::DM_INTERNAL_SUSPEND_FLAG;
        /// In: Measure the table with IMA.
        const DM_IMA_MEASUREMENT      = dmi::DM_IMA_MEASUREMENT_FLAG;
    }
}
