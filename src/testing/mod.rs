// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Modules that support testing.

mod fake_kernel;
mod logger;

pub use self::{
    fake_kernel::{deps_list, name_list, target_list, versions_list, FakeKernel, Reply},
    logger::init_logger,
};
