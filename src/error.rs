use std::path::PathBuf;

use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - The class-file bytes violate the format
/// - [`Error::OutOfBounds`] - A read ran past the end of the buffer
/// - [`Error::NotSupported`] - Wrong magic or a construct the codec does not handle
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Path`] - An error tied to a specific input or output path
/// - [`Error::Archive`] - A jar could not be read or written
///
/// ## Transformation Errors
/// - [`Error::ContractViolation`] - An internal invariant of the shadow pipeline broke
/// - [`Error::AlreadyDeclared`] - A member signature is declared twice in one class
///
/// ## Serialization Errors
/// - [`Error::UnresolvedLabel`] - A branch target was never placed
/// - [`Error::BranchOutOfRange`] - A branch offset does not fit its encoding
/// - [`Error::FrameComputation`] - Stack-map frames could not be derived
/// - [`Error::ConstantPoolOverflow`] - More than 65535 constant pool slots
/// - [`Error::UnfinishedMember`] - A member consumer was dropped before its end event
///
/// # Examples
///
/// ```rust
/// use shadowclass::{transform_class, Error};
///
/// match transform_class(&[0xDE, 0xAD, 0xBE, 0xEF]) {
///     Err(Error::NotSupported) => {}
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The class file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The input is not a class file, or uses a construct this codec does not handle.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A jar (zip archive) could not be read or written.
    #[error("Archive error - {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// An error that occurred while processing a specific path.
    #[error("{}: {source}", .path.display())]
    Path {
        /// The input or output path being processed
        path: PathBuf,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// An internal invariant of the shadow pipeline was broken.
    ///
    /// This indicates a logic defect, not bad input, and aborts the class being processed.
    #[error("Contract violation in {class}.{method}{descriptor}: {message}")]
    ContractViolation {
        /// Internal name of the class being transformed
        class: String,
        /// Name of the member whose body was being rewritten
        method: String,
        /// Descriptor of the member whose body was being rewritten
        descriptor: String,
        /// What went wrong
        message: String,
    },

    /// A member with the same name and descriptor has already been declared on the class.
    #[error("{class}.{name}{descriptor} is already declared")]
    AlreadyDeclared {
        /// Internal name of the class
        class: String,
        /// Member name
        name: String,
        /// Member descriptor
        descriptor: String,
    },

    /// A branch, switch or table entry references a label that was never placed.
    #[error("Unresolved label in {method}")]
    UnresolvedLabel {
        /// `name + descriptor` of the member being written
        method: String,
    },

    /// A branch offset does not fit the instruction's offset encoding.
    #[error("Branch offset {offset} out of range in {method}")]
    BranchOutOfRange {
        /// `name + descriptor` of the member being written
        method: String,
        /// The offending relative offset
        offset: i64,
    },

    /// Stack-map frames or stack limits could not be derived from an instruction sequence.
    #[error("Frame computation failed in {method}: {message}")]
    FrameComputation {
        /// `name + descriptor` of the member being written
        method: String,
        /// What went wrong
        message: String,
    },

    /// The constant pool would exceed the 65535 slots the format allows.
    #[error("Constant pool overflow")]
    ConstantPoolOverflow,

    /// A member consumer was opened but never received its end event.
    #[error("{class}.{name}{descriptor} was never finished")]
    UnfinishedMember {
        /// Internal name of the class
        class: String,
        /// Member name
        name: String,
        /// Member descriptor
        descriptor: String,
    },
}

impl Error {
    /// Attach the path being processed to this error.
    #[must_use]
    pub fn at_path(self, path: impl Into<PathBuf>) -> Error {
        Error::Path {
            path: path.into(),
            source: Box::new(self),
        }
    }
}
