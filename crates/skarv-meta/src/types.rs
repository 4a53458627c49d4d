//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings, matching the wire
//! format of the archive API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the inner string is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for String {
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Remote identifier of a case container, assigned by the archive on
    /// registration.
    CaseId
);

string_newtype!(
    /// Remote identifier of one uploaded object (metadata + blob pair),
    /// assigned by the archive on metadata upload.
    ObjectId
);

string_newtype!(
    /// Unique case identifier read from the manifest at `case.uuid`.
    /// Chosen by the producing workflow, not by the archive.
    CaseUuid
);
