// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A stand-in for the devicemapper control node.
//!
//! `FakeKernel` answers ioctls from canned payloads the way the kernel
//! does: it reports a full buffer when the reply will not fit, and
//! otherwise writes the reply header and payload into the caller's buffer.
//! The payload builders lay records out as drivers/md/dm-ioctl.c does.

use std::{cell::RefCell, collections::HashMap};

use nix::errno::Errno;

use crate::core::{align_to, Device, DmFlags, DmIoctl, Transport, DM_IOCTL_SIZE};

/// What the fake answers for one command.
#[derive(Clone, Debug, Default)]
pub struct Reply {
    pub payload: Vec<u8>,
    pub target_count: u32,
    /// Report a full buffer no matter how large the buffer is.
    pub always_full: bool,
}

impl Reply {
    pub fn payload(payload: Vec<u8>) -> Reply {
        Reply {
            payload,
            ..Default::default()
        }
    }
}

/// One ioctl as the fake saw it.
#[derive(Clone, Debug)]
pub struct Call {
    pub cmd: u8,
    pub buf_size: usize,
    pub hdr: DmIoctl,
}

#[derive(Debug)]
pub struct FakeKernel {
    version: [u32; 3],
    replies: HashMap<u8, Result<Reply, Errno>>,
    calls: RefCell<Vec<Call>>,
}

impl FakeKernel {
    /// A fake reporting interface version 4.48.0, that knows no commands.
    pub fn new() -> FakeKernel {
        FakeKernel {
            version: [4, 48, 0],
            replies: HashMap::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_version(mut self, version: [u32; 3]) -> FakeKernel {
        self.version = version;
        self
    }

    /// Answer `cmd` with `reply`.
    pub fn reply(mut self, cmd: u8, reply: Reply) -> FakeKernel {
        self.replies.insert(cmd, Ok(reply));
        self
    }

    /// Fail `cmd` with `errno`.
    pub fn fail(mut self, cmd: u8, errno: Errno) -> FakeKernel {
        self.replies.insert(cmd, Err(errno));
        self
    }

    /// Every ioctl received so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl Default for FakeKernel {
    fn default() -> FakeKernel {
        FakeKernel::new()
    }
}

impl Transport for FakeKernel {
    fn ioctl(&self, cmd: u8, buf: &mut [u8]) -> nix::Result<()> {
        let mut hdr = DmIoctl::from_bytes(buf).map_err(|_| Errno::EFAULT)?;
        self.calls.borrow_mut().push(Call {
            cmd,
            buf_size: buf.len(),
            hdr: hdr.clone(),
        });

        // The kernel rejects a header that misdescribes its buffer.
        if hdr.data_size as usize != buf.len() || hdr.data_start as usize != DM_IOCTL_SIZE {
            return Err(Errno::EINVAL);
        }

        let reply = match self.replies.get(&cmd) {
            None => return Err(Errno::ENOTTY),
            Some(Err(errno)) => return Err(*errno),
            Some(Ok(reply)) => reply,
        };

        hdr.version = self.version;
        hdr.target_count = reply.target_count;

        let needed = DM_IOCTL_SIZE + reply.payload.len();
        if reply.always_full || needed > buf.len() {
            hdr.flags |= DmFlags::DM_BUFFER_FULL.bits();
        } else {
            hdr.flags &= !DmFlags::DM_BUFFER_FULL.bits();
            hdr.data_size = needed as u32;
            buf[DM_IOCTL_SIZE..needed].copy_from_slice(&reply.payload);
        }

        hdr.write_to(buf).map_err(|_| Errno::EFAULT)
    }
}

fn kdev(dev: Device) -> u32 {
    dev.to_kdev_t().expect("test device fits kernel encoding")
}

fn pad_record(buf: &mut Vec<u8>, start: usize) {
    let len = align_to(buf.len() - start, 8);
    buf.resize(start + len, 0);
}

/// A DM_LIST_DEVICES payload. Each entry carries an event number only if
/// one is given, as kernels from interface 4.37 on do for every entry.
pub fn name_list(entries: &[(Device, &str, Option<u32>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (i, (dev, name, event_nr)) in entries.iter().enumerate() {
        let start = buf.len();
        buf.extend_from_slice(&u64::from(kdev(*dev)).to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        if let Some(event_nr) = event_nr {
            pad_record(&mut buf, start);
            buf.extend_from_slice(&event_nr.to_ne_bytes());
            // flags
            buf.extend_from_slice(&0u32.to_ne_bytes());
        }
        pad_record(&mut buf, start);
        if i + 1 < entries.len() {
            let next = (buf.len() - start) as u32;
            buf[start + 8..start + 12].copy_from_slice(&next.to_ne_bytes());
        }
    }
    buf
}

/// A DM_TABLE_STATUS payload. Offsets to the next target are measured
/// from the start of the payload. The final offset points past the end
/// of the payload, since the padding after the last params string is not
/// counted.
pub fn target_list(targets: &[(u64, u64, &str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut used = 0;
    for (start_sector, length, target_type, params) in targets {
        let start = buf.len();
        buf.extend_from_slice(&start_sector.to_ne_bytes());
        buf.extend_from_slice(&length.to_ne_bytes());
        // status
        buf.extend_from_slice(&0i32.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        let mut type_field = [0u8; 16];
        type_field[..target_type.len()].copy_from_slice(target_type.as_bytes());
        buf.extend_from_slice(&type_field);
        buf.extend_from_slice(params.as_bytes());
        buf.push(0);

        used = buf.len();
        let next = align_to(used, 8);
        buf[start + 20..start + 24].copy_from_slice(&(next as u32).to_ne_bytes());
        buf.resize(next, 0);
    }
    buf.truncate(used);
    buf
}

/// A DM_LIST_VERSIONS payload.
pub fn versions_list(targets: &[(&str, [u32; 3])]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (i, (name, version)) in targets.iter().enumerate() {
        let start = buf.len();
        buf.extend_from_slice(&0u32.to_ne_bytes());
        for v in version {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        pad_record(&mut buf, start);
        if i + 1 < targets.len() {
            let next = (buf.len() - start) as u32;
            buf[start..start + 4].copy_from_slice(&next.to_ne_bytes());
        }
    }
    buf
}

/// A DM_TABLE_DEPS payload.
pub fn deps_list(devs: &[Device]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(devs.len() as u32).to_ne_bytes());
    // padding
    buf.extend_from_slice(&0u32.to_ne_bytes());
    for dev in devs {
        buf.extend_from_slice(&u64::from(kdev(*dev)).to_ne_bytes());
    }
    buf
}
