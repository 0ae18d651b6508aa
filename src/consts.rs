// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[allow(non_upper_case_globals)]
#[allow(non_snake_case)]
/// International Electrotechnical Commission Units Standards
pub mod IEC {
    /// kibi
    pub const Ki: u64 = 1024;
    /// mebi
    pub const Mi: u64 = 1024 * Ki;
    /// gibi
    pub const Gi: u64 = 1024 * Mi;
}

/// Control path for user space to pass IOCTL to kernel DM
pub const DM_CTL_PATH: &str = "/dev/mapper/control";

/// The first response buffer size tried for any ioctl.
pub const MIN_BUF_SIZE: usize = IEC::Ki as usize;

/// The largest response buffer size tried before giving up.
pub const MAX_BUF_SIZE: usize = 64 * IEC::Ki as usize;
