//! Epub Builder
//!
//! This module provides functionality for assembling EPUB 3 container files.
//! The `Epub` structure holds the whole book model in memory: metadata, the file
//! registry, the spine and the navigation outlines. Writing the book renders the
//! package document, the navigation document and the container descriptor, then
//! packs them together with every registered file into a zip archive.
//!
//! ## Usage
//!
//! ```rust, no_run
//! # fn main() -> Result<(), epubuilder::error::EpubError> {
//! use epubuilder::{
//!     builder::Epub,
//!     types::{File, Joint, Metadata, Section},
//! };
//!
//! let mut book = Epub::new();
//! book.add_metadata(Metadata::Title("Test Book".to_string()))
//!     .add_metadata(Metadata::Language("en".to_string()))
//!     .add_metadata(Metadata::Identifier("urn:isbn:1234567890".to_string()));
//!
//! book.add_file("chap1.xhtml", File::new(b"<html>...</html>".to_vec()))?
//!     .add_spine(Joint::new("chap1.xhtml"))
//!     .add_section(Section::new("Chapter 1").with_href("chap1.xhtml"));
//!
//! book.write("output.epub")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Archive layout
//!
//! - `mimetype`, stored first and uncompressed
//! - `META-INF/container.xml`
//! - `EPUB/package.opf` and `EPUB/nav.xhtml` (renamed when the names are taken)
//! - `EPUB/<path>` for every registered file
//!
//! ## Notes
//!
//! - The model is only read while writing, so a book can be written many times.
//! - Every reference is resolved before the archive is created; a failed build
//!   never leaves a file at the destination.

mod manifest;
mod navigation;

#[cfg(feature = "addons")]
mod addons;

use std::{
    collections::HashSet,
    fs,
    io::{Cursor, Seek, Write},
    path::{Path, PathBuf},
};

use chrono::Utc;
use indexmap::IndexMap;
use log::{debug, warn};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::{
    builder::{
        manifest::{IdAllocator, Manifest},
        navigation::Outlines,
    },
    error::{EpubBuilderError, EpubError},
    types::{File, Joint, Metadata, Section, Toc, format_modified},
    utils::{
        CONTAINER_NAMESPACE, DC_NAMESPACE, MIMETYPE, NCX_MIME, OPF_MIME, OPF_NAMESPACE,
        XHTML_MIME, lookup_path, normalize_path,
    },
};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Directory of the archive holding the package document and all registered files
pub const ROOT_OF_OPF: &str = "EPUB";

/// Path of the container descriptor, fixed by the OCF specification
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

const NAV_FILE_NAME: &str = "nav.xhtml";
const OPF_FILE_NAME: &str = "package.opf";
const NCX_FILE_NAME: &str = "toc.ncx";

/// Identifier id candidate, suffixed when several identifiers are present
const IDENTIFIER_ID: &str = "pub-id";

const DEFAULT_LANGUAGE: &str = "en";

/// File registry
///
/// An ordered map from archive-relative path to [File]. Paths are normalized on
/// insertion, and inserting a path twice replaces the previous file while keeping
/// its position. Paths are relative to the `EPUB` directory of the archive, which
/// is also the directory of the package and navigation documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Files {
    entries: IndexMap<String, File>,
}

impl Files {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file
    ///
    /// ## Parameters
    /// - `path`: Archive-relative path of the file
    /// - `file`: The file to register
    ///
    /// ## Return
    /// - `Ok(Some(File))`: The path was registered before, the previous file is returned
    /// - `Ok(None)`: The path is new
    /// - `Err(EpubError)`: The path, or the fallback path of the file, is not legal
    pub fn insert(&mut self, path: &str, mut file: File) -> Result<Option<File>, EpubError> {
        let path = normalize_path(path)?;
        if let Some(fallback) = file.fallback.take() {
            file.fallback = Some(normalize_path(&fallback)?);
        }

        Ok(self.entries.insert(path, file))
    }

    pub fn get(&self, path: &str) -> Option<&File> {
        self.entries.get(&lookup_path(path))
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut File> {
        self.entries.get_mut(&lookup_path(path))
    }

    /// Removes a file, keeping the order of the remaining ones
    pub fn remove(&mut self, path: &str) -> Option<File> {
        self.entries.shift_remove(&lookup_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(&lookup_path(path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the registered files in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &File)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

/// Options of a single write
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Deflate level of the compressed entries, the zip default when `None`
    pub compression_level: Option<i64>,

    /// Whether to generate an EPUB 2 NCX alongside the navigation document
    pub legacy_ncx: bool,

    /// Number of toc levels rendered into the NCX, all levels when `None`
    pub ncx_depth: Option<usize>,
}

/// EPUB Builder
///
/// The in-memory model of a book. The model is built up with the `add_*` methods
/// and serialized with [Epub::write], [Epub::write_with] or [Epub::write_to].
///
/// `Epub` owns all its data. Mutating it requires `&mut self`, so a single
/// instance can not be changed from several threads at once, while separate
/// instances are fully independent.
#[derive(Debug, Clone, Default)]
pub struct Epub {
    metadata: Vec<Metadata>,
    files: Files,
    spine: Vec<Joint>,
    toc: Toc,
    landmarks: Vec<Section>,
    page_list: Vec<Section>,
}

/// Everything resolved before the archive is written
struct Package {
    /// Id of each metadata entry, `Some` for identifiers
    metadata_ids: Vec<Option<String>>,
    unique_identifier: String,
    unique_identifier_value: String,
    manifest: Manifest,
    opf_name: String,
    nav_name: String,
    ncx: Option<(String, String)>,
}

impl Epub {
    /// Create a new, empty `Epub`
    pub fn new() -> Self {
        Self::default()
    }

    /// Add metadata entry
    ///
    /// At least one [Metadata::Identifier] is required when writing the book.
    pub fn add_metadata(&mut self, item: Metadata) -> &mut Self {
        self.metadata.push(item);
        self
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Vec<Metadata> {
        &mut self.metadata
    }

    pub fn files(&self) -> &Files {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut Files {
        &mut self.files
    }

    /// Register a file under an archive-relative path
    ///
    /// A file registered under an existing path replaces the previous one.
    pub fn add_file(&mut self, path: &str, file: File) -> Result<&mut Self, EpubError> {
        if self.files.insert(path, file)?.is_some() {
            debug!("replaced the file registered under '{}'", path);
        }
        Ok(self)
    }

    /// Register a file read from the local file system
    ///
    /// The media type is left to inference.
    ///
    /// ## Parameters
    /// - `path`: Archive-relative path of the file
    /// - `source`: Local file path
    pub fn add_file_from_path<P: AsRef<Path>>(
        &mut self,
        path: &str,
        source: P,
    ) -> Result<&mut Self, EpubError> {
        let source = source.as_ref();
        if !source.is_file() {
            return Err(EpubBuilderError::TargetIsNotFile {
                target_path: source.to_string_lossy().to_string(),
            }
            .into());
        }

        let binary = fs::read(source)?;
        self.add_file(path, File::new(binary))
    }

    /// Register every file of a local directory, recursively
    ///
    /// Each file is registered under `prefix` joined with its path relative to
    /// `source_dir`. Entries are visited in file name order.
    ///
    /// ## Return
    /// - `Ok(Vec<String>)`: The registered archive-relative paths
    /// - `Err(EpubError)`: Error occurred while walking or reading the directory
    pub fn add_directory<P: AsRef<Path>>(
        &mut self,
        source_dir: P,
        prefix: &str,
    ) -> Result<Vec<String>, EpubError> {
        let source_dir = source_dir.as_ref();
        let mut registered = Vec::new();

        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            // a file given as `source_dir` is its own walk root
            let relative = match entry.path().strip_prefix(source_dir) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
                _ => PathBuf::from(entry.file_name()),
            };
            let relative = relative.to_string_lossy().replace('\\', "/");

            let path = match prefix.trim_matches('/') {
                "" => relative,
                prefix => format!("{}/{}", prefix, relative),
            };

            self.add_file_from_path(&path, entry.path())?;
            registered.push(normalize_path(&path)?);
        }

        debug!(
            "registered {} files from '{}'",
            registered.len(),
            source_dir.display()
        );
        Ok(registered)
    }

    /// Add spine entry
    ///
    /// The spine defines the reading order of the book. The referenced path
    /// is resolved when the book is written.
    pub fn add_spine(&mut self, item: Joint) -> &mut Self {
        self.spine.push(item);
        self
    }

    pub fn spine(&self) -> &[Joint] {
        &self.spine
    }

    pub fn spine_mut(&mut self) -> &mut Vec<Joint> {
        &mut self.spine
    }

    /// Set the title of the table of contents
    pub fn set_toc_title(&mut self, title: &str) -> &mut Self {
        self.toc.set_title(title);
        self
    }

    /// Append a top level section to the table of contents
    pub fn add_section(&mut self, section: Section) -> &mut Self {
        self.toc.add_section(section);
        self
    }

    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    pub fn toc_mut(&mut self) -> &mut Toc {
        &mut self.toc
    }

    /// Append a landmark, such as the start of the body matter
    ///
    /// The structural semantics are given with [Section::with_type].
    pub fn add_landmark(&mut self, section: Section) -> &mut Self {
        self.landmarks.push(section);
        self
    }

    /// Append a page break location to the page list
    pub fn add_page(&mut self, section: Section) -> &mut Self {
        self.page_list.push(section);
        self
    }

    /// Create an XHTML page presenting the table of contents
    ///
    /// The returned file is not registered; add it to the files and the spine
    /// to make it part of the book.
    pub fn make_toc_page(&self, title: &str) -> Result<File, EpubError> {
        let binary = navigation::make_toc_page(&self.toc, title, self.language())?;
        Ok(File::new(binary).with_mime(XHTML_MIME))
    }

    /// Write the book to the specified path with default options
    pub fn write<P: AsRef<Path>>(&self, output_path: P) -> Result<(), EpubError> {
        self.write_with(output_path, &WriteOptions::default())
    }

    /// Write the book to the specified path
    ///
    /// The archive is assembled in memory; the destination file is only created
    /// once the whole book rendered successfully.
    ///
    /// ## Parameters
    /// - `output_path`: Output file path
    /// - `options`: Write options
    ///
    /// ## Return
    /// - `Ok(())`: Build successful
    /// - `Err(EpubError)`: Error occurred during the build process
    pub fn write_with<P: AsRef<Path>>(
        &self,
        output_path: P,
        options: &WriteOptions,
    ) -> Result<(), EpubError> {
        let output_path = output_path.as_ref();
        let data = self.write_to(Cursor::new(Vec::new()), options)?.into_inner();

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        if let Err(err) = fs::write(output_path, data) {
            if output_path.exists() {
                if let Err(remove_err) = fs::remove_file(output_path) {
                    warn!("{}", remove_err);
                }
            }
            return Err(err.into());
        }

        debug!("wrote '{}'", output_path.display());
        Ok(())
    }

    /// Write the book as a zip archive into `writer`
    ///
    /// Nothing is written into `writer` unless every reference of the model resolves.
    ///
    /// ## Return
    /// - `Ok(W)`: The writer, positioned after the archive
    /// - `Err(EpubError)`: Error occurred during the build process
    pub fn write_to<W: Write + Seek>(
        &self,
        writer: W,
        options: &WriteOptions,
    ) -> Result<W, EpubError> {
        let package = self.prepare(options)?;

        let container = Self::make_container_xml(&format!("{}/{}", ROOT_OF_OPF, package.opf_name))?;
        let opf = self.make_opf_file(&package)?;
        let nav = navigation::make_navigation_document(
            &Outlines {
                toc: &self.toc,
                landmarks: &self.landmarks,
                page_list: &self.page_list,
            },
            self.navigation_title(),
            self.language(),
        )?;
        let ncx = match &package.ncx {
            Some((name, _)) => Some((
                name,
                navigation::make_ncx(
                    &self.toc,
                    &package.unique_identifier_value,
                    self.navigation_title(),
                    self.language(),
                    options.ncx_depth,
                )?,
            )),
            None => None,
        };

        let mut zip = ZipWriter::new(writer);
        let stored = FileOptions::<()>::default().compression_method(CompressionMethod::Stored);
        let deflated = FileOptions::<()>::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(options.compression_level);

        // the mimetype entry must come first and stay uncompressed
        zip.start_file("mimetype", stored)?;
        zip.write_all(MIMETYPE.as_bytes())?;

        zip.start_file(CONTAINER_PATH, deflated)?;
        zip.write_all(&container)?;

        zip.start_file(format!("{}/{}", ROOT_OF_OPF, package.opf_name), deflated)?;
        zip.write_all(&opf)?;

        zip.start_file(format!("{}/{}", ROOT_OF_OPF, package.nav_name), deflated)?;
        zip.write_all(&nav)?;

        if let Some((name, data)) = ncx {
            zip.start_file(format!("{}/{}", ROOT_OF_OPF, name), deflated)?;
            zip.write_all(&data)?;
        }

        for (path, file) in self.files.iter() {
            zip.start_file(format!("{}/{}", ROOT_OF_OPF, path), deflated)?;
            zip.write_all(&file.binary)?;
        }

        Ok(zip.finish()?)
    }

    /// Language of the publication: the first language metadata, `en` otherwise
    fn language(&self) -> &str {
        self.metadata
            .iter()
            .find_map(|item| match item {
                Metadata::Language(language) => Some(language.as_str()),
                _ => None,
            })
            .unwrap_or(DEFAULT_LANGUAGE)
    }

    /// Title of the navigation documents: the toc title, then the book title
    fn navigation_title(&self) -> &str {
        if let Some(title) = &self.toc.title {
            return title;
        }

        self.metadata
            .iter()
            .find_map(|item| match item {
                Metadata::Title(title) => Some(title.as_str()),
                _ => None,
            })
            .unwrap_or("Table of Contents")
    }

    /// Resolve every reference of the model
    ///
    /// # Error conditions
    /// - No identifier metadata
    /// - A cover or spine entry references an unregistered path
    /// - A fallback chain is broken or circular
    /// - The media type of a file can not be determined
    fn prepare(&self, options: &WriteOptions) -> Result<Package, EpubError> {
        let Some(unique_identifier_value) = self.metadata.iter().find_map(|item| match item {
            Metadata::Identifier(value) => Some(value.clone()),
            _ => None,
        }) else {
            return Err(EpubBuilderError::MissingIdentifier.into());
        };

        if !self.metadata.iter().any(|item| matches!(item, Metadata::Title(_))) {
            warn!("The book has no title metadata.");
        }
        if !self.metadata.iter().any(|item| matches!(item, Metadata::Language(_))) {
            warn!(
                "The book has no language metadata, '{}' is assumed.",
                DEFAULT_LANGUAGE
            );
        }

        // identifiers are allocated first so that their ids stay stable
        let mut ids = IdAllocator::default();
        let metadata_ids = self
            .metadata
            .iter()
            .map(|item| match item {
                Metadata::Identifier(_) => Some(ids.allocate(IDENTIFIER_ID)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let unique_identifier = metadata_ids
            .iter()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_else(|| IDENTIFIER_ID.to_string());

        let mut cover_paths = HashSet::new();
        for item in &self.metadata {
            if let Metadata::Cover(path) = item {
                if !self.files.contains(path) {
                    return Err(EpubBuilderError::DanglingCoverReference {
                        path: path.clone(),
                    }
                    .into());
                }
                cover_paths.insert(lookup_path(path));
            }
        }

        let mut manifest = Manifest::build(&self.files, &cover_paths, &mut ids)?;

        for joint in &self.spine {
            if manifest.id_of(&joint.path).is_none() {
                return Err(EpubBuilderError::DanglingSpineReference {
                    path: joint.path.clone(),
                }
                .into());
            }
        }

        let mut taken = self.files.paths().cloned().collect::<HashSet<_>>();
        let nav_name = unused_file_name(NAV_FILE_NAME, &mut taken)?;
        let ncx_name = match options.legacy_ncx {
            true => Some(unused_file_name(NCX_FILE_NAME, &mut taken)?),
            false => None,
        };
        let opf_name = unused_file_name(OPF_FILE_NAME, &mut taken)?;

        manifest.push_generated(&nav_name, XHTML_MIME, Some("nav"), &mut ids);
        let ncx = ncx_name.map(|name| {
            let id = manifest.push_generated(&name, NCX_MIME, None, &mut ids).id.clone();
            (name, id)
        });

        Ok(Package {
            metadata_ids,
            unique_identifier,
            unique_identifier_value,
            manifest,
            opf_name,
            nav_name,
            ncx,
        })
    }

    /// Creates the `container.xml` file
    fn make_container_xml(opf_path: &str) -> Result<Vec<u8>, EpubError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        writer.write_event(Event::Start(BytesStart::new("container").with_attributes(
            [("version", "1.0"), ("xmlns", CONTAINER_NAMESPACE)],
        )))?;
        writer.write_event(Event::Start(BytesStart::new("rootfiles")))?;
        writer.write_event(Event::Empty(BytesStart::new("rootfile").with_attributes([
            ("full-path", opf_path),
            ("media-type", OPF_MIME),
        ])))?;
        writer.write_event(Event::End(BytesEnd::new("rootfiles")))?;
        writer.write_event(Event::End(BytesEnd::new("container")))?;

        Ok(writer.into_inner().into_inner())
    }

    /// Creates the `OPF` file
    fn make_opf_file(&self, package: &Package) -> Result<Vec<u8>, EpubError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        writer.write_event(Event::Start(BytesStart::new("package").with_attributes([
            ("xmlns", OPF_NAMESPACE),
            ("version", "3.0"),
            ("xml:lang", self.language()),
            ("unique-identifier", package.unique_identifier.as_str()),
        ])))?;

        self.make_opf_metadata(&mut writer, package)?;
        Self::make_opf_manifest(&mut writer, &package.manifest)?;
        self.make_opf_spine(&mut writer, package)?;

        writer.write_event(Event::End(BytesEnd::new("package")))?;

        Ok(writer.into_inner().into_inner())
    }

    fn make_opf_metadata(&self, writer: &mut XmlWriter, package: &Package) -> Result<(), EpubError> {
        writer.write_event(Event::Start(
            BytesStart::new("metadata").with_attributes([("xmlns:dc", DC_NAMESPACE)]),
        ))?;

        for (metadata, id) in self.metadata.iter().zip(&package.metadata_ids) {
            match metadata {
                Metadata::Cover(path) => {
                    let content = package
                        .manifest
                        .id_of(path)
                        .ok_or_else(|| EpubBuilderError::DanglingCoverReference {
                            path: path.clone(),
                        })?;

                    writer.write_event(Event::Empty(
                        BytesStart::new("meta")
                            .with_attributes([("name", "cover"), ("content", content)]),
                    ))?;
                }

                Metadata::Modified(_) => {
                    Self::make_meta(writer, "dcterms:modified", &metadata.value())?;
                }

                Metadata::Meta { property, value } => {
                    Self::make_meta(writer, property, value)?;
                }

                _ => {
                    let Some(name) = metadata.dc_name() else {
                        continue;
                    };
                    let tag_name = format!("dc:{}", name);

                    let mut start = BytesStart::new(tag_name.as_str());
                    if let Some(id) = id {
                        start.push_attribute(("id", id.as_str()));
                    }

                    writer.write_event(Event::Start(start))?;
                    writer.write_event(Event::Text(BytesText::new(&metadata.value())))?;
                    writer.write_event(Event::End(BytesEnd::new(tag_name.as_str())))?;
                }
            }
        }

        if !self
            .metadata
            .iter()
            .any(|item| matches!(item, Metadata::Modified(_)))
        {
            Self::make_meta(writer, "dcterms:modified", &format_modified(&Utc::now()))?;
        }

        writer.write_event(Event::End(BytesEnd::new("metadata")))?;

        Ok(())
    }

    fn make_meta(writer: &mut XmlWriter, property: &str, value: &str) -> Result<(), EpubError> {
        writer.write_event(Event::Start(
            BytesStart::new("meta").with_attributes([("property", property)]),
        ))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new("meta")))?;

        Ok(())
    }

    fn make_opf_manifest(writer: &mut XmlWriter, manifest: &Manifest) -> Result<(), EpubError> {
        writer.write_event(Event::Start(BytesStart::new("manifest")))?;

        for item in manifest.items() {
            writer.write_event(Event::Empty(
                BytesStart::new("item").with_attributes(item.attributes()),
            ))?;
        }

        writer.write_event(Event::End(BytesEnd::new("manifest")))?;

        Ok(())
    }

    fn make_opf_spine(&self, writer: &mut XmlWriter, package: &Package) -> Result<(), EpubError> {
        let mut spine = BytesStart::new("spine");
        if let Some((_, ncx_id)) = &package.ncx {
            spine.push_attribute(("toc", ncx_id.as_str()));
        }
        writer.write_event(Event::Start(spine))?;

        for joint in &self.spine {
            writer.write_event(Event::Empty(
                BytesStart::new("itemref").with_attributes(joint_attributes(joint, &package.manifest)?),
            ))?;
        }

        writer.write_event(Event::End(BytesEnd::new("spine")))?;

        Ok(())
    }
}

/// Resolves the attributes of the `<itemref>` of a spine entry
fn joint_attributes<'a>(
    joint: &'a Joint,
    manifest: &'a Manifest,
) -> Result<Vec<(&'a str, &'a str)>, EpubError> {
    let idref = manifest
        .id_of(&joint.path)
        .ok_or_else(|| EpubBuilderError::DanglingSpineReference {
            path: joint.path.clone(),
        })?;

    let mut attributes = vec![("idref", idref)];
    match joint.linear {
        Some(true) => attributes.push(("linear", "yes")),
        Some(false) => attributes.push(("linear", "no")),
        None => {}
    }
    if let Some(properties) = &joint.properties {
        attributes.push(("properties", properties.as_str()));
    }

    Ok(attributes)
}

/// Finds a file name that is not taken yet and marks it as taken
///
/// `name` itself is tried first, then `stem_1.ext`, `stem_2.ext`, ... Only
/// `taken.len() + 1` candidates can be needed, which bounds the search.
fn unused_file_name(name: &str, taken: &mut HashSet<String>) -> Result<String, EpubError> {
    let (stem, extension) = match name.rfind('.') {
        Some(index) => name.split_at(index),
        None => (name, ""),
    };

    let candidates = std::iter::once(name.to_string())
        .chain((1..=taken.len()).map(|index| format!("{}_{}{}", stem, index, extension)));

    for candidate in candidates {
        if taken.insert(candidate.clone()) {
            return Ok(candidate);
        }
    }

    Err(EpubBuilderError::NoAvailableFileName {
        file_name: name.to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, io::Cursor};

    use chrono::{TimeZone, Utc};

    use crate::{
        builder::{Epub, Files, WriteOptions, unused_file_name},
        error::{EpubBuilderError, EpubError},
        types::{File, Joint, Metadata, Section},
    };

    fn minimal_book() -> Epub {
        let mut book = Epub::new();
        book.add_metadata(Metadata::Title("Test Book".to_string()))
            .add_metadata(Metadata::Language("en".to_string()))
            .add_metadata(Metadata::Identifier("urn:isbn:1234567890".to_string()));
        book.add_file("chap1.xhtml", File::new(b"<html>Hello</html>".to_vec()))
            .unwrap();
        book.add_spine(Joint::new("chap1.xhtml"));
        book
    }

    fn opf_of(book: &Epub, options: &WriteOptions) -> String {
        let package = book.prepare(options).unwrap();
        String::from_utf8(book.make_opf_file(&package).unwrap()).unwrap()
    }

    #[test]
    fn test_epub_new() {
        let book = Epub::new();

        assert!(book.metadata().is_empty());
        assert!(book.files().is_empty());
        assert!(book.spine().is_empty());
        assert!(book.toc().is_empty());
    }

    #[test]
    fn test_files_insert_replaces() {
        let mut files = Files::new();
        files.insert("a.xhtml", File::new(b"first".to_vec())).unwrap();
        files.insert("b.xhtml", File::new(b"second".to_vec())).unwrap();

        let previous = files.insert("/a.xhtml", File::new(b"third".to_vec())).unwrap();

        assert_eq!(previous.unwrap().binary, b"first");
        assert_eq!(files.len(), 2);
        assert_eq!(files.paths().collect::<Vec<_>>(), vec!["a.xhtml", "b.xhtml"]);
        assert_eq!(files.get("a.xhtml").unwrap().binary, b"third");
    }

    #[test]
    fn test_files_insert_illegal_path() {
        let mut files = Files::new();

        let result = files.insert("../escape.xhtml", File::new(b"".to_vec()));
        assert_eq!(
            result.unwrap_err(),
            EpubError::from(EpubBuilderError::IllegalFilePath {
                path: "../escape.xhtml".to_string()
            })
        );

        let result = files.insert("ok.xhtml", File::new(b"".to_vec()).with_fallback("../x"));
        assert!(result.is_err());
        assert!(files.is_empty());
    }

    #[test]
    fn test_files_remove_keeps_order() {
        let mut files = Files::new();
        for path in ["a.css", "b.css", "c.css"] {
            files.insert(path, File::new(b"".to_vec())).unwrap();
        }

        assert!(files.remove("b.css").is_some());
        assert!(!files.contains("b.css"));
        assert_eq!(files.paths().collect::<Vec<_>>(), vec!["a.css", "c.css"]);
    }

    /// Lookups accept the same spellings as registration
    #[test]
    fn test_files_lookup_normalizes() {
        let mut files = Files::new();
        files.insert("text\\a.xhtml", File::new(b"a".to_vec())).unwrap();

        assert!(files.contains("text\\a.xhtml"));
        assert!(files.contains("/text/./a.xhtml"));
        assert_eq!(files.get("text\\a.xhtml").unwrap().binary, b"a");
        assert!(files.get_mut("./text/a.xhtml").is_some());
        assert!(files.remove("text\\a.xhtml").is_some());
        assert!(files.is_empty());
    }

    /// Spine entries and covers resolve with any spelling of a registered path
    #[test]
    fn test_prepare_resolves_unnormalized_references() {
        let mut book = minimal_book();
        book.add_file("text/a.xhtml", File::new(b"<html/>".to_vec()))
            .unwrap()
            .add_file("img/c.png", File::new(vec![0x89, b'P', b'N', b'G']))
            .unwrap()
            .add_spine(Joint::new("text\\a.xhtml"))
            .add_spine(Joint::new("/text/a.xhtml"))
            .add_metadata(Metadata::Cover("img\\c.png".to_string()));

        let opf = opf_of(&book, &WriteOptions::default());

        assert_eq!(opf.matches(r#"<itemref idref="text:a.xhtml"/>"#).count(), 2);
        assert!(opf.contains(r#"<meta name="cover" content="img:c.png"/>"#));
        assert!(opf.contains(
            r#"<item id="img:c.png" href="img/c.png" media-type="image/png" properties="cover-image"/>"#
        ));
    }

    /// A fallback edited in place after registration still resolves
    #[test]
    fn test_prepare_resolves_edited_fallback() {
        let mut book = minimal_book();
        book.add_file("p.dat", File::new(b"\x00".to_vec()).with_mime("x/custom"))
            .unwrap()
            .add_file("x.xhtml", File::new(b"<html/>".to_vec()))
            .unwrap();
        book.files_mut().get_mut("p.dat").unwrap().fallback = Some("/x.xhtml".to_string());

        let opf = opf_of(&book, &WriteOptions::default());

        assert!(opf.contains(
            r#"<item id="p.dat" href="p.dat" media-type="x/custom" fallback="x.xhtml"/>"#
        ));
    }

    /// A registered `./nav.xhtml` is the same file as `nav.xhtml`
    #[test]
    fn test_prepare_dot_segment_collision() {
        let mut book = minimal_book();
        book.add_file("./nav.xhtml", File::new(b"<html/>".to_vec()))
            .unwrap();

        let package = book.prepare(&WriteOptions::default()).unwrap();

        assert!(book.files().paths().any(|path| path == "nav.xhtml"));
        assert_eq!(package.nav_name, "nav_1.xhtml");
    }

    #[test]
    fn test_unused_file_name() {
        let mut taken = HashSet::from(["nav.xhtml".to_string(), "nav_1.xhtml".to_string()]);

        assert_eq!(unused_file_name("nav.xhtml", &mut taken).unwrap(), "nav_2.xhtml");
        assert_eq!(unused_file_name("nav.xhtml", &mut taken).unwrap(), "nav_3.xhtml");
        assert_eq!(unused_file_name("package.opf", &mut taken).unwrap(), "package.opf");
        assert_eq!(unused_file_name("README", &mut taken).unwrap(), "README");
        assert_eq!(unused_file_name("README", &mut taken).unwrap(), "README_1");
    }

    #[test]
    fn test_prepare_missing_identifier() {
        let mut book = Epub::new();
        book.add_metadata(Metadata::Title("Test Book".to_string()));

        let result = book.prepare(&WriteOptions::default());
        assert_eq!(
            result.err(),
            Some(EpubError::from(EpubBuilderError::MissingIdentifier))
        );
    }

    #[test]
    fn test_prepare_dangling_spine() {
        let mut book = minimal_book();
        book.add_spine(Joint::new("missing.xhtml"));

        let result = book.prepare(&WriteOptions::default());
        assert_eq!(
            result.err(),
            Some(EpubError::from(EpubBuilderError::DanglingSpineReference {
                path: "missing.xhtml".to_string()
            }))
        );
    }

    #[test]
    fn test_prepare_dangling_cover() {
        let mut book = minimal_book();
        book.add_metadata(Metadata::Cover("cover.png".to_string()));

        let result = book.prepare(&WriteOptions::default());
        assert_eq!(
            result.err(),
            Some(EpubError::from(EpubBuilderError::DanglingCoverReference {
                path: "cover.png".to_string()
            }))
        );
    }

    /// Generated documents never take the name of a registered file
    #[test]
    fn test_prepare_generated_names() {
        let mut book = minimal_book();
        book.add_file("nav.xhtml", File::new(b"<html/>".to_vec()))
            .unwrap()
            .add_file("package.opf", File::new(b"<package/>".to_vec()).with_mime("text/plain"))
            .unwrap();

        let package = book
            .prepare(&WriteOptions {
                legacy_ncx: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(package.nav_name, "nav_1.xhtml");
        assert_eq!(package.opf_name, "package_1.opf");
        assert_eq!(package.ncx, Some(("toc.ncx".to_string(), "toc.ncx".to_string())));
        assert_eq!(package.manifest.id_of("nav.xhtml"), Some("nav.xhtml"));
        assert_eq!(package.manifest.id_of("nav_1.xhtml"), Some("nav_1.xhtml"));
    }

    #[test]
    fn test_make_opf_file() {
        let mut book = minimal_book();
        book.add_metadata(Metadata::Modified(
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        ))
        .add_metadata(Metadata::Meta {
            property: "belongs-to-collection".to_string(),
            value: "Series".to_string(),
        });
        book.add_spine(Joint::new("chap1.xhtml").with_linear(false))
            .add_spine(Joint::new("chap1.xhtml").with_linear(true));

        let opf = opf_of(&book, &WriteOptions::default());

        assert!(opf.contains(
            r#"<package xmlns="http://www.idpf.org/2007/opf" version="3.0" xml:lang="en" unique-identifier="pub-id">"#
        ));
        assert!(opf.contains(r#"<dc:identifier id="pub-id">urn:isbn:1234567890</dc:identifier>"#));
        assert!(opf.contains("<dc:title>Test Book</dc:title>"));
        assert!(opf.contains(r#"<meta property="dcterms:modified">2024-01-02T03:04:05Z</meta>"#));
        assert!(opf.contains(r#"<meta property="belongs-to-collection">Series</meta>"#));
        assert!(opf.contains(
            r#"<item id="chap1.xhtml" href="chap1.xhtml" media-type="application/xhtml+xml"/>"#
        ));
        assert!(opf.contains(
            r#"<item id="nav.xhtml" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#
        ));
        assert!(opf.contains(r#"<itemref idref="chap1.xhtml"/>"#));
        assert!(opf.contains(r#"<itemref idref="chap1.xhtml" linear="no"/>"#));
        assert!(opf.contains(r#"<itemref idref="chap1.xhtml" linear="yes"/>"#));
        assert_eq!(opf.matches("dcterms:modified").count(), 1);
    }

    /// A modification time is generated when none is given
    #[test]
    fn test_make_opf_file_default_modified() {
        let opf = opf_of(&minimal_book(), &WriteOptions::default());
        assert_eq!(opf.matches(r#"<meta property="dcterms:modified">"#).count(), 1);
    }

    /// The first identifier is the unique identifier, later ones get their own ids
    #[test]
    fn test_make_opf_file_multiple_identifiers() {
        let mut book = minimal_book();
        book.add_metadata(Metadata::Identifier("urn:uuid:second".to_string()));

        let opf = opf_of(&book, &WriteOptions::default());

        assert!(opf.contains(r#"unique-identifier="pub-id""#));
        assert!(opf.contains(r#"<dc:identifier id="pub-id_1">urn:uuid:second</dc:identifier>"#));
    }

    #[test]
    fn test_make_opf_file_cover() {
        let mut book = minimal_book();
        book.add_file("images/cover.png", File::new(vec![0x89, b'P', b'N', b'G']))
            .unwrap()
            .add_metadata(Metadata::Cover("images/cover.png".to_string()));

        let opf = opf_of(&book, &WriteOptions::default());

        assert!(opf.contains(r#"<meta name="cover" content="images:cover.png"/>"#));
        assert!(opf.contains(
            r#"<item id="images:cover.png" href="images/cover.png" media-type="image/png" properties="cover-image"/>"#
        ));
    }

    #[test]
    fn test_make_opf_file_legacy_ncx() {
        let opf = opf_of(
            &minimal_book(),
            &WriteOptions {
                legacy_ncx: true,
                ..Default::default()
            },
        );

        assert!(opf.contains(r#"<spine toc="toc.ncx">"#));
        assert!(opf.contains(
            r#"<item id="toc.ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#
        ));
    }

    #[test]
    fn test_make_container_xml() {
        let container = Epub::make_container_xml("EPUB/package.opf").unwrap();
        let container = String::from_utf8(container).unwrap();

        assert!(container.contains(
            r#"<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">"#
        ));
        assert!(container.contains(
            r#"<rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/>"#
        ));
    }

    /// A failed build does not touch the writer
    #[test]
    fn test_write_to_failure_writes_nothing() {
        let mut book = Epub::new();
        book.add_file("a.xhtml", File::new(b"<html/>".to_vec())).unwrap();

        let mut buffer = Cursor::new(Vec::new());
        let result = book.write_to(&mut buffer, &WriteOptions::default());

        assert!(result.is_err());
        assert!(buffer.into_inner().is_empty());
    }

    #[test]
    fn test_make_toc_page() {
        let mut book = minimal_book();
        book.add_section(Section::new("Chapter 1").with_href("chap1.xhtml"));

        let page = book.make_toc_page("Contents").unwrap();
        let content = String::from_utf8(page.binary).unwrap();

        assert_eq!(page.mime.as_deref(), Some("application/xhtml+xml"));
        assert!(content.contains(r#"<a href="chap1.xhtml">Chapter 1</a>"#));
    }
}
