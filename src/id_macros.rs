// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Identifiers that devicemapper stores in fixed-width, \0-terminated
// fields: device names, device uuids, and target type names.

// Evaluates to an error string if the value cannot be stored in a field of
// $field_len bytes with room for the trailing \0.
macro_rules! field_check {
    ($value:expr, $field_len:expr) => {{
        let value = $value;
        let max_allowed_chars = $field_len - 1;
        if value.is_empty() {
            Some("value has zero characters".into())
        } else if value.contains('\0') {
            Some(format!("value {:?} contains a \\0", value))
        } else if value.len() > max_allowed_chars {
            Some(format!(
                "value {} has {} bytes which is greater than maximum allowed {}",
                value,
                value.len(),
                max_allowed_chars
            ))
        } else {
            None
        }
    }};
}

// As field_check!, and additionally rejects non-ascii values. Applied to
// identifiers this library is asked to send.
macro_rules! str_check {
    ($value:expr, $field_len:expr) => {{
        let value = $value;
        if !value.is_ascii() {
            Some(format!("value {} has some non-ascii characters", value))
        } else {
            field_check!(value, $field_len)
        }
    }};
}

/// Define borrowed and owned versions of string types that guarantee
/// conformance to DM restrictions, such as maximum length.
// This implementation follows the example of Path/PathBuf as closely as
// possible.
macro_rules! str_id {
    ($B:ident, $O:ident, $FIELD_LEN:expr, $err_func:ident) => {
        /// The borrowed version of the DM identifier.
        #[derive(Debug, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        pub struct $B {
            inner: str,
        }

        /// The owned version of the DM identifier.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $O {
            inner: String,
        }

        impl $B {
            /// Create a new borrowed identifier from a `&str`.
            pub fn new(value: &str) -> $crate::result::DmResult<&$B> {
                if let Some(err_msg) = str_check!(value, $FIELD_LEN) {
                    return Err($err_func(&err_msg));
                }
                Ok($B::from_checked(value))
            }

            // $B is repr(transparent) over str.
            fn from_checked(value: &str) -> &$B {
                unsafe { &*(value as *const str as *const $B) }
            }

            /// Get the inner value as bytes
            pub fn as_bytes(&self) -> &[u8] {
                self.inner.as_bytes()
            }

            /// Get the inner value as a string slice
            pub fn as_str(&self) -> &str {
                &self.inner
            }
        }

        impl ToOwned for $B {
            type Owned = $O;
            fn to_owned(&self) -> $O {
                $O {
                    inner: self.inner.to_owned(),
                }
            }
        }

        impl std::fmt::Display for $B {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", &self.inner)
            }
        }

        impl PartialEq<str> for $B {
            fn eq(&self, other: &str) -> bool {
                &self.inner == other
            }
        }

        impl $O {
            /// Construct a new owned identifier.
            pub fn new(value: String) -> $crate::result::DmResult<$O> {
                if let Some(err_msg) = str_check!(&value, $FIELD_LEN) {
                    return Err($err_func(&err_msg));
                }
                Ok($O { inner: value })
            }

            /// Construct an owned identifier from a value the kernel
            /// returned. The kernel does not restrict identifiers to ascii,
            /// so only the field constraints are checked.
            pub(crate) fn from_kernel(value: String) -> $crate::result::DmResult<$O> {
                if let Some(err_msg) = field_check!(&value, $FIELD_LEN) {
                    return Err($err_func(&err_msg));
                }
                Ok($O { inner: value })
            }
        }

        impl std::fmt::Display for $O {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", &self.inner)
            }
        }

        impl AsRef<$B> for $O {
            fn as_ref(&self) -> &$B {
                self
            }
        }

        impl std::borrow::Borrow<$B> for $O {
            fn borrow(&self) -> &$B {
                std::ops::Deref::deref(self)
            }
        }

        impl std::ops::Deref for $O {
            type Target = $B;
            fn deref(&self) -> &$B {
                $B::from_checked(&self.inner)
            }
        }
    };
}
