//! Epub builder library
//!
//! A Rust library for assembling EPUB 3 eBook files from in-memory resources.
//!
//! The book is described as a plain data model: metadata entries, a registry of
//! files keyed by their path inside the container, a spine giving the reading
//! order and a table of contents tree. Writing the book generates the package
//! document, the navigation document and the container descriptor, and packs
//! everything into an OCF zip archive.
//!
//! ## Features
//!
//! - Build EPUB 3 containers with a `mimetype` entry readers can sniff.
//! - Generate unique manifest ids from file paths, including fallback chains.
//! - Generate the navigation document with table of contents, landmarks and page list.
//! - Optional EPUB 2 NCX for legacy reading systems.
//!
//! ## Quick Start
//!
//! ```rust, no_run
//! # fn main() -> Result<(), epubuilder::error::EpubError> {
//! use epubuilder::{Epub, File, Joint, Metadata, Section};
//!
//! let mut book = Epub::new();
//! book.add_metadata(Metadata::Title("Test Book".to_string()))
//!     .add_metadata(Metadata::Identifier("urn:uuid:0f9fd2a8-31ea-4d7e".to_string()));
//!
//! book.add_file("chap1.xhtml", File::new(b"<html>...</html>".to_vec()))?
//!     .add_spine(Joint::new("chap1.xhtml"))
//!     .add_section(Section::new("Chapter 1").with_href("chap1.xhtml"));
//!
//! book.write("path/to/book.epub")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `addons` (default): Enable [Epub::make_image_page], which reads image
//!   dimensions with the `image` crate.

pub(crate) mod utils;

pub mod builder;
pub mod error;
pub mod types;

pub use builder::{Epub, Files, WriteOptions};
pub use error::{EpubBuilderError, EpubError};
pub use types::{File, Joint, Metadata, Section, Toc};
