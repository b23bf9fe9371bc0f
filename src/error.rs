//! Error Type Definition Module
//!
//! This module defines the error types that may be encountered while assembling
//! an EPUB container. All errors are uniformly wrapped in the `EpubError`
//! enumeration for convenient error handling by the caller.
//!
//! ## Main Error Types
//!
//! - [EpubError] - Enumeration of errors raised by collaborators (zip, xml, io, ...)
//! - [EpubBuilderError] - Errors caused by an inconsistent book model

use thiserror::Error;

/// Types of errors that can occur during EPUB assembly
///
/// This enumeration wraps the errors of the libraries used while writing
/// the container, as well as the model errors described by [EpubBuilderError].
#[derive(Debug, Error)]
pub enum EpubError {
    /// ZIP archive related errors
    ///
    /// Errors occur when writing the ZIP structure of the EPUB file.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    #[error("Epub builder error: {source}")]
    EpubBuilderError { source: EpubBuilderError },

    /// Image decoding error
    ///
    /// Raised by the add-ons when the dimensions of a raster image can not be read.
    #[cfg(feature = "addons")]
    #[error("Image error: {source}")]
    ImageError { source: image::ImageError },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// QuickXml error
    ///
    /// This error occurs when writing or reading XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },

    /// WalkDir error
    ///
    /// This error occurs when using the WalkDir library to traverse a resource directory.
    #[error("WalkDir error: {source}")]
    WalkDirError { source: walkdir::Error },
}

impl From<zip::result::ZipError> for EpubError {
    fn from(value: zip::result::ZipError) -> Self {
        EpubError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        EpubError::QuickXmlError { source: value }
    }
}

impl From<quick_xml::events::attributes::AttrError> for EpubError {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        EpubError::QuickXmlError {
            source: value.into(),
        }
    }
}

impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::IOError { source: value }
    }
}

impl From<EpubBuilderError> for EpubError {
    fn from(value: EpubBuilderError) -> Self {
        EpubError::EpubBuilderError { source: value }
    }
}

impl From<walkdir::Error> for EpubError {
    fn from(value: walkdir::Error) -> Self {
        EpubError::WalkDirError { source: value }
    }
}

#[cfg(feature = "addons")]
impl From<image::ImageError> for EpubError {
    fn from(value: image::ImageError) -> Self {
        EpubError::ImageError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for EpubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::EpubBuilderError { source: l_source },
                Self::EpubBuilderError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

/// Types of errors that can occur during EPUB build
///
/// These errors describe a book model that can not be turned into a valid
/// container: a reference that does not resolve, a path that escapes the
/// container, or missing mandatory metadata. They are detected before any
/// byte of the archive is written.
#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum EpubBuilderError {
    /// Cover reference error
    ///
    /// This error is triggered when a `Cover` metadata entry names a path
    /// that is not registered in the file registry.
    #[error("The cover '{path}' is not registered in the files.")]
    DanglingCoverReference { path: String },

    /// Spine reference error
    ///
    /// This error is triggered when a spine entry references a path that
    /// was never registered in the file registry.
    #[error("The spine references '{path}', which is not registered in the files.")]
    DanglingSpineReference { path: String },

    /// File not found error
    ///
    /// This error is triggered when an add-on is asked to work on a path
    /// that is not registered in the file registry.
    #[error("The file '{path}' is not registered in the files.")]
    FileNotFound { path: String },

    /// Illegal file path error
    ///
    /// This error is triggered when a file is registered with an empty path or a
    /// path containing a '..' segment, which would point outside the container.
    #[error("The path '{path}' is not a legal path inside the container.")]
    IllegalFilePath { path: String },

    /// Manifest Circular Reference error
    ///
    /// This error is triggered when a fallback relationship between files forms a cycle.
    #[error("Circular reference detected in fallback chain for '{fallback_chain}'.")]
    ManifestCircularReference { fallback_chain: String },

    /// Manifest resource not found error
    ///
    /// This error is triggered when a file specifies a fallback path that does not exist.
    #[error("Fallback resource '{path}' does not exist in the files.")]
    ManifestNotFound { path: String },

    /// Missing identifier error
    ///
    /// This error is triggered when the metadata does not contain any identifier,
    /// which is required to fill the `unique-identifier` attribute of the package.
    #[error("Requires at least one 'identifier' metadata to build the package document.")]
    MissingIdentifier,

    /// No available file name error
    ///
    /// This error is triggered when no free name could be found for a generated document.
    #[error("Unable to find an unused file name for '{file_name}'.")]
    NoAvailableFileName { file_name: String },

    /// Target is not a file error
    ///
    /// This error is triggered when the specified local path is not a file.
    #[error("Expect a file, but '{target_path}' is not a file.")]
    TargetIsNotFile { target_path: String },

    /// Unknown file format error
    ///
    /// This error is triggered when no media type is declared for a file and
    /// neither its extension nor its content identifies the format.
    #[error("Unable to analyze the file '{file_path}' type.")]
    UnknownFileFormat { file_path: String },

    /// Unsupported image error
    ///
    /// This error is triggered when the dimensions of an image can not be determined.
    #[error("Unable to read the dimensions of the image '{path}'.")]
    UnsupportedImage { path: String },
}
