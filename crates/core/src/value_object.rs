//! Values without identity.

/// Marker for types that are equal exactly when their contents are.
///
/// `CountryCode` is the one in this workspace: `"us"`, `" US "` and `"US"` all
/// normalize to the same value and nothing tells two instances apart. A
/// `BlockEntry`, by contrast, is an entity: two blocks of `"DE"` created at
/// different times are different blocks.
///
/// Constructors validate and normalize, so holding a value means holding a valid one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
