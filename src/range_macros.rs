// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// An omnibus macro that defines a u64 newtype counting some unit, along
// with the arithmetic, formatting, and serde impls every such unit gets.
macro_rules! range_u64 {
    ( $(#[$comment:meta])? $T:ident, $display_name:expr ) => {
        $(
            #[$comment]
        )?
        #[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $T(pub u64);

        impl $T {
            /// Add two items of this type, return None if overflow.
            pub fn checked_add(&self, other: $T) -> Option<$T> {
                self.0.checked_add(other.0).map($T)
            }
        }

        impl std::ops::Deref for $T {
            type Target = u64;
            fn deref(&self) -> &u64 {
                &self.0
            }
        }

        impl From<u64> for $T {
            fn from(val: u64) -> $T {
                $T(val)
            }
        }

        impl std::ops::Add for $T {
            type Output = $T;
            fn add(self, rhs: $T) -> $T {
                $T(self.0 + rhs.0)
            }
        }

        impl std::ops::AddAssign for $T {
            fn add_assign(&mut self, rhs: $T) {
                self.0 += rhs.0
            }
        }

        impl std::ops::Sub for $T {
            type Output = $T;
            fn sub(self, rhs: $T) -> $T {
                $T(self.0 - rhs.0)
            }
        }

        impl std::ops::SubAssign for $T {
            fn sub_assign(&mut self, rhs: $T) {
                self.0 -= rhs.0
            }
        }

        impl std::ops::Mul<u64> for $T {
            type Output = $T;
            fn mul(self, rhs: u64) -> $T {
                $T(self.0 * rhs)
            }
        }

        impl std::ops::Div<u64> for $T {
            type Output = $T;
            fn div(self, rhs: u64) -> $T {
                $T(self.0 / rhs)
            }
        }

        impl std::ops::Div<$T> for $T {
            type Output = u64;
            fn div(self, rhs: $T) -> u64 {
                self.0 / rhs.0
            }
        }

        impl std::iter::Sum for $T {
            fn sum<I: Iterator<Item = $T>>(iter: I) -> $T {
                iter.fold($T::default(), std::ops::Add::add)
            }
        }

        impl std::fmt::Debug for $T {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($T), self.0)
            }
        }

        impl std::fmt::Display for $T {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{} {}", self.0, $display_name)
            }
        }

        impl serde::Serialize for $T {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_u64(self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $T {
            fn deserialize<D>(deserializer: D) -> Result<$T, D::Error>
            where
                D: serde::de::Deserializer<'de>,
            {
                Ok($T(serde::Deserialize::deserialize(deserializer)?))
            }
        }
    };
}
