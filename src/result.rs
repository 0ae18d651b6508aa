// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{error::Error, fmt};

use crate::core::errors;

/// The kinds of failure met while interpreting what the kernel returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorEnum {
    /// a value, such as a target status line, did not have the expected form
    Invalid,
    /// a target was asked to be read as a type it is not
    WrongTarget,
}

impl fmt::Display for ErrorEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorEnum::Invalid => write!(f, "invalid value"),
            ErrorEnum::WrongTarget => write!(f, "wrong target type"),
        }
    }
}

/// Super error type, distinguishing errors in interpreting kernel data
/// from errors in talking to the kernel.
#[derive(Clone, Debug)]
pub enum DmError {
    /// Errors interpreting target-specific data
    Dm(ErrorEnum, String),
    /// Errors in the core ioctl functionality
    Core(errors::Error),
}

/// return result for DM functions
pub type DmResult<T> = Result<T, DmError>;

impl From<errors::Error> for DmError {
    fn from(err: errors::Error) -> DmError {
        DmError::Core(err)
    }
}

impl fmt::Display for DmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DmError::Core(ref err) => write!(f, "DM Core error: {err}"),
            DmError::Dm(ref err, ref msg) => write!(f, "DM error: {err}: {msg}"),
        }
    }
}

impl Error for DmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DmError::Core(err) => Some(err),
            DmError::Dm(_, _) => None,
        }
    }
}
