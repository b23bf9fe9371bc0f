use std::path::Path;

use infer::Infer;

use crate::error::{EpubBuilderError, EpubError};

pub const MIMETYPE: &str = "application/epub+zip";
pub const OPF_MIME: &str = "application/oebps-package+xml";
pub const XHTML_MIME: &str = "application/xhtml+xml";
pub const NCX_MIME: &str = "application/x-dtbncx+xml";

pub const CONTAINER_NAMESPACE: &str = "urn:oasis:names:tc:opendocument:xmlns:container";
pub const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
pub const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const OPS_NAMESPACE: &str = "http://www.idpf.org/2007/ops";
pub const NCX_NAMESPACE: &str = "http://www.daisy.org/z3986/2005/ncx/";
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// Extension to media type table, covering the EPUB 3 core media types
const MEDIA_TABLE: &[(&str, &str)] = &[
    // images
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    // documents
    ("html", XHTML_MIME),
    ("htm", XHTML_MIME),
    ("xhtml", XHTML_MIME),
    ("xht", XHTML_MIME),
    ("smil", "application/smil+xml"),
    ("pls", "application/pls+xml"),
    ("ncx", NCX_MIME),
    ("opf", OPF_MIME),
    // fonts
    ("otf", "font/otf"),
    ("ttf", "font/ttf"),
    ("ttc", "font/collection"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    // audio and video
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("opus", "audio/ogg"),
    // styles and scripts
    ("css", "text/css"),
    ("js", "application/javascript"),
];

/// Derives an XML id candidate from a file path
///
/// Every character outside `[A-Za-z0-9:._-]` is replaced with `:`, and the
/// result is prefixed with `P_` when it does not start with a letter.
pub fn xml_identify(path: &str) -> String {
    let mut identifier: String = path
        .chars()
        .map(|char| match char {
            'A'..='Z' | 'a'..='z' | '0'..='9' | ':' | '.' | '_' | '-' => char,
            _ => ':',
        })
        .collect();

    if !identifier.starts_with(|char: char| char.is_ascii_alphabetic()) {
        identifier.insert_str(0, "P_");
    }

    identifier
}

/// Normalizes an archive-relative path
///
/// Backslashes are converted to slashes, and empty and `.` segments are removed,
/// which also drops leading slashes. Empty paths and paths containing a `..`
/// segment are rejected, since they can not be located inside the container.
pub fn normalize_path(path: &str) -> Result<String, EpubError> {
    let normalized = clean_path(path);

    if normalized.is_empty() || normalized.split('/').any(|segment| segment == "..") {
        return Err(EpubBuilderError::IllegalFilePath {
            path: path.to_string(),
        }
        .into());
    }

    Ok(normalized)
}

/// Returns the registry key a path refers to
///
/// Lookups go through the same normalization as registration. An illegal path
/// is returned cleaned but never matches a registered file.
pub fn lookup_path(path: &str) -> String {
    clean_path(path)
}

fn clean_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Computes the path of `target` relative to the directory `base_dir`
///
/// Both paths are archive-relative and use `/` as separator.
pub fn relative_path(base_dir: &str, target: &str) -> String {
    let base = base_dir
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<&str>>();
    let target = target
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<&str>>();

    // the last segment of the target is the file name and is never shared
    let common = base
        .iter()
        .zip(target.iter().take(target.len().saturating_sub(1)))
        .take_while(|(left, right)| left == right)
        .count();

    let mut segments = vec![".."; base.len() - common];
    segments.extend(&target[common..]);
    segments.join("/")
}

/// Returns the parent directory of an archive-relative path, `""` for top level files
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// Looks up the media type of a path in the extension table
pub fn mime_from_extension(path: &str) -> Option<&'static str> {
    let extension = Path::new(path).extension()?.to_string_lossy().to_lowercase();

    MEDIA_TABLE
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Infers the media type of a file
///
/// The extension table is consulted first; content sniffing is the fallback.
pub fn infer_mime(path: &str, binary: &[u8]) -> Option<String> {
    if let Some(mime) = mime_from_extension(path) {
        return Some(mime.to_string());
    }

    let extension = match Path::new(path).extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => String::new(),
    };

    Infer::new()
        .get(binary)
        .map(|infer_mime| refine_mime_type(infer_mime.mime_type(), &extension))
}

/// Refine the mime type
///
/// Optimize mime types inferred from file content based on file extensions
fn refine_mime_type(infer_mime: &str, extension: &str) -> String {
    match (infer_mime, extension) {
        ("text/xml", "xhtml")
        | ("application/xml", "xhtml")
        | ("text/html", _)
        | ("text/xml", "xht")
        | ("application/xml", "xht") => XHTML_MIME.to_string(),

        ("text/xml", "opf") | ("application/xml", "opf") => OPF_MIME.to_string(),
        ("text/xml", "ncx") | ("application/xml", "ncx") => NCX_MIME.to_string(),

        ("application/zip", "epub") => MIMETYPE.to_string(),

        ("application/font-woff", _) => "font/woff".to_string(),
        ("application/font-sfnt", "otf") => "font/otf".to_string(),
        ("application/font-sfnt", _) => "font/ttf".to_string(),

        _ => infer_mime.to_string(),
    }
}
