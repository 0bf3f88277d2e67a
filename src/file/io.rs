//! Big-endian byte order helpers for reading and writing class-file structures.
//!
//! Every multi-byte quantity in a class file is stored big-endian. This module provides the
//! [`crate::file::io::ClassIO`] trait, implemented for the primitive integer types the format
//! uses, together with bounds-checked free functions for reading from and writing to byte
//! buffers.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Conversion between primitives and their big-endian bytes
//! - [`crate::file::io::read_be`] / [`crate::file::io::read_be_at`] - Bounds-checked reads
//! - [`crate::file::io::write_be_at`] - Bounds-checked in-place patching of an existing buffer
//! - [`crate::file::io::push_be`] - Appending to a growable output buffer
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use crate::file::io::{read_be_at, push_be};
//!
//! let mut out = Vec::new();
//! push_be(&mut out, 0xCAFE_BABE_u32);
//! push_be(&mut out, 52_u16);
//!
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&out, &mut offset)?;
//! let major: u16 = read_be_at(&out, &mut offset)?;
//! assert_eq!(magic, 0xCAFE_BABE);
//! assert_eq!(major, 52);
//! # Ok::<(), shadowclass::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Conversion between a primitive and its big-endian byte representation.
///
/// Implemented for the integer widths that occur in class files (`u1`, `u2`, `u4` and the
/// signed 8-byte constants). All implementations are pure conversions.
pub trait ClassIO: Sized {
    /// The fixed-size byte array backing this type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode a value from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Encode a value into big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

impl ClassIO for u64 {
    type Bytes = [u8; 8];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        u64::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        u64::to_be_bytes(self)
    }
}

impl ClassIO for i64 {
    type Bytes = [u8; 8];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        i64::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        i64::to_be_bytes(self)
    }
}

impl ClassIO for u32 {
    type Bytes = [u8; 4];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        u32::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        u32::to_be_bytes(self)
    }
}

impl ClassIO for i32 {
    type Bytes = [u8; 4];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        i32::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        i32::to_be_bytes(self)
    }
}

impl ClassIO for u16 {
    type Bytes = [u8; 2];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        u16::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        u16::to_be_bytes(self)
    }
}

impl ClassIO for i16 {
    type Bytes = [u8; 2];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        i16::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        i16::to_be_bytes(self)
    }
}

impl ClassIO for u8 {
    type Bytes = [u8; 1];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        u8::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        u8::to_be_bytes(self)
    }
}

impl ClassIO for i8 {
    type Bytes = [u8; 1];

    fn from_be_bytes(bytes: Self::Bytes) -> Self {
        i8::from_be_bytes(bytes)
    }

    fn to_be_bytes(self) -> Self::Bytes {
        i8::to_be_bytes(self)
    }
}

/// Reads a big-endian value of type `T` from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Reads a big-endian value of type `T` at `offset` and advances the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_be_bytes(read))
}

/// Overwrites `size_of::<T>()` bytes at `offset` with the big-endian encoding of `value` and
/// advances the offset.
///
/// Used to patch placeholders (branch offsets, attribute lengths, counts) after the final
/// value is known.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the write would run past the end of `data`.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(value.to_be_bytes().as_ref());
    *offset = end;

    Ok(())
}

/// Appends the big-endian encoding of `value` to `out`.
pub fn push_be<T: ClassIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}
