use chrono::{DateTime, SecondsFormat, Utc};

/// Represents a metadata entry of the EPUB publication
///
/// Each variant renders to exactly one element of the `<metadata>` block of the
/// package document. The Dublin Core variants are written as `dc:*` elements,
/// the remaining ones as `<meta>` elements.
///
/// At least one [Metadata::Identifier] is required to write a book: the first
/// identifier in insertion order becomes the `unique-identifier` of the package.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    Title(String),
    Language(String),
    Identifier(String),
    Creator(String),
    Contributor(String),
    Publisher(String),
    Date(String),
    Description(String),
    Subject(String),
    Rights(String),
    Source(String),

    /// Last modification time, written as `dcterms:modified`
    ///
    /// When absent, the current UTC time is used at write time.
    Modified(DateTime<Utc>),

    /// Cover image, given as a path registered in the files
    ///
    /// Renders the EPUB 2 style `<meta name="cover">` pointing at the manifest id
    /// of the image, and marks the manifest item with the `cover-image` property.
    Cover(String),

    /// Any other `<meta property="...">` entry
    Meta { property: String, value: String },
}

impl Metadata {
    /// Returns the element name in the `dc` namespace, if this entry is a Dublin Core element
    pub(crate) fn dc_name(&self) -> Option<&'static str> {
        match self {
            Metadata::Title(_) => Some("title"),
            Metadata::Language(_) => Some("language"),
            Metadata::Identifier(_) => Some("identifier"),
            Metadata::Creator(_) => Some("creator"),
            Metadata::Contributor(_) => Some("contributor"),
            Metadata::Publisher(_) => Some("publisher"),
            Metadata::Date(_) => Some("date"),
            Metadata::Description(_) => Some("description"),
            Metadata::Subject(_) => Some("subject"),
            Metadata::Rights(_) => Some("rights"),
            Metadata::Source(_) => Some("source"),
            Metadata::Modified(_) | Metadata::Cover(_) | Metadata::Meta { .. } => None,
        }
    }

    /// Returns the text content of the rendered element
    pub fn value(&self) -> String {
        match self {
            Metadata::Title(value)
            | Metadata::Language(value)
            | Metadata::Identifier(value)
            | Metadata::Creator(value)
            | Metadata::Contributor(value)
            | Metadata::Publisher(value)
            | Metadata::Date(value)
            | Metadata::Description(value)
            | Metadata::Subject(value)
            | Metadata::Rights(value)
            | Metadata::Source(value)
            | Metadata::Cover(value) => value.clone(),
            Metadata::Meta { value, .. } => value.clone(),
            Metadata::Modified(time) => format_modified(time),
        }
    }
}

/// Formats a timestamp the way `dcterms:modified` expects it (`CCYY-MM-DDThh:mm:ssZ`)
pub(crate) fn format_modified(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Represents a file to be packed into the container
///
/// The file is registered in [crate::builder::Files] under its archive-relative path.
/// When `mime` is `None`, the media type is inferred from the path extension and,
/// failing that, from the content itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// Raw content of the file
    pub binary: Vec<u8>,

    /// Declared media type
    pub mime: Option<String>,

    /// Optional fallback file path
    ///
    /// The path of another registered file that reading systems should use when
    /// they do not support the media type of this one. The path is only resolved
    /// when the book is written.
    pub fallback: Option<String>,

    /// Optional space-separated manifest properties, such as `scripted` or `svg`
    pub properties: Option<String>,
}

impl File {
    /// Creates a file whose media type will be inferred
    pub fn new(binary: impl Into<Vec<u8>>) -> Self {
        Self {
            binary: binary.into(),
            mime: None,
            fallback: None,
            properties: None,
        }
    }

    /// Sets the declared media type
    pub fn with_mime(mut self, mime: &str) -> Self {
        self.mime = Some(mime.to_string());
        self
    }

    /// Sets the fallback file path
    pub fn with_fallback(mut self, fallback: &str) -> Self {
        self.fallback = Some(fallback.to_string());
        self
    }

    /// Appends a manifest property
    pub fn append_property(mut self, property: &str) -> Self {
        self.properties = match self.properties {
            Some(properties) => Some(format!("{} {}", properties, property)),
            None => Some(property.to_string()),
        };
        self
    }
}

/// Represents an entry of the spine, defining the reading order of the publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joint {
    /// Path of a file registered in the files
    pub path: String,

    /// Linear reading flag
    ///
    /// `Some(true)` renders `linear="yes"`, `Some(false)` renders `linear="no"`,
    /// `None` omits the attribute so that reading systems use their default.
    pub linear: Option<bool>,

    /// Optional space-separated itemref properties, such as `page-spread-left`
    pub properties: Option<String>,
}

impl Joint {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            linear: None,
            properties: None,
        }
    }

    /// Sets the linear reading flag
    pub fn with_linear(mut self, linear: bool) -> Self {
        self.linear = Some(linear);
        self
    }

    pub fn with_properties(mut self, properties: &str) -> Self {
        self.properties = Some(properties.to_string());
        self
    }
}

/// Represents a section in the table of contents
///
/// Sections form a tree: each one owns its subsections. A section without
/// `href` renders as a plain label instead of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The display title of this section
    pub title: String,

    /// The path (optionally with a fragment) this section links to
    pub href: Option<String>,

    /// Child sections
    pub subsections: Vec<Section>,

    /// Whether the list of subsections is hidden from the rendered table of contents
    pub hidden: Option<bool>,

    /// Structural semantics of the link, such as `bodymatter` or `cover`
    ///
    /// Only meaningful for landmarks, where it renders as `epub:type`.
    pub epub_type: Option<String>,
}

impl Section {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            href: None,
            subsections: vec![],
            hidden: None,
            epub_type: None,
        }
    }

    /// Sets the link target
    pub fn with_href(mut self, href: &str) -> Self {
        self.href = Some(href.to_string());
        self
    }

    /// Sets whether the subsections are hidden
    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    /// Sets the structural semantics of the link
    pub fn with_type(mut self, epub_type: &str) -> Self {
        self.epub_type = Some(epub_type.to_string());
        self
    }

    /// Appends a subsection
    pub fn add_subsection(&mut self, section: Section) -> &mut Self {
        self.subsections.push(section);
        self
    }

    /// Appends a subsection, consuming and returning the section
    pub fn with_subsection(mut self, section: Section) -> Self {
        self.subsections.push(section);
        self
    }

    /// Returns the depth of the tree rooted at this section, counting this section as 1
    pub fn depth(&self) -> usize {
        1 + self
            .subsections
            .iter()
            .map(Section::depth)
            .max()
            .unwrap_or(0)
    }

    /// Returns the first href found in a depth-first walk of this tree
    pub(crate) fn first_href(&self) -> Option<&str> {
        if let Some(href) = &self.href {
            return Some(href);
        }

        self.subsections.iter().find_map(Section::first_href)
    }
}

/// The table of contents: an optional title and a tree of sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toc {
    pub title: Option<String>,
    pub sections: Vec<Section>,
}

impl Toc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_title(&mut self, title: &str) -> &mut Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn add_section(&mut self, section: Section) -> &mut Self {
        self.sections.push(section);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Returns the depth of the deepest branch, 0 for an empty table of contents
    pub fn depth(&self) -> usize {
        self.sections.iter().map(Section::depth).max().unwrap_or(0)
    }
}
