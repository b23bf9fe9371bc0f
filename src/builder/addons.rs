//! Image page add-on
//!
//! Generates an XHTML page displaying a single registered image, scaled to the
//! viewport with an SVG wrapper. This is the usual way of presenting a cover image.

use std::io::Cursor;

use image::ImageReader;
use log::debug;
use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{
    builder::Epub,
    error::{EpubBuilderError, EpubError},
    types::File,
    utils::{
        OPS_NAMESPACE, SVG_NAMESPACE, XHTML_MIME, XHTML_NAMESPACE, XLINK_NAMESPACE, infer_mime,
        lookup_path, parent_dir, relative_path,
    },
};

const SVG_MIME: &str = "image/svg+xml";

impl Epub {
    /// Make an XHTML page containing a registered image
    ///
    /// The returned file is not registered; add it to the files (under `page_path`)
    /// and usually as the first spine entry.
    ///
    /// ## Parameters
    /// - `image_path`: Path of the image in the files
    /// - `page_path`: Path the page will be registered under, used to compute the
    ///   relative link to the image; the top level when `None`
    /// - `width`, `height`: Image dimensions, read from the image when `None`
    ///
    /// ## Return
    /// - `Ok(File)`: The XHTML page, with the `svg` manifest property
    /// - `Err(EpubError)`: The image is not registered, or its dimensions can not be read
    pub fn make_image_page(
        &self,
        image_path: &str,
        page_path: Option<&str>,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<File, EpubError> {
        let image = self
            .files
            .get(image_path)
            .ok_or_else(|| EpubBuilderError::FileNotFound {
                path: image_path.to_string(),
            })?;
        let image_path = lookup_path(image_path);

        let (width, height) = match (width, height) {
            (Some(width), Some(height)) => (width, height),
            (width, height) => {
                let (probed_width, probed_height) = image_dimensions(&image_path, image)?;
                (width.unwrap_or(probed_width), height.unwrap_or(probed_height))
            }
        };

        let href = relative_path(parent_dir(&lookup_path(page_path.unwrap_or(""))), &image_path);
        debug!("image page for '{}' links '{}' ({}x{})", image_path, href, width, height);

        let binary = make_image_xhtml(&href, width, height, self.language())?;
        Ok(File::new(binary)
            .with_mime(XHTML_MIME)
            .append_property("svg"))
    }
}

/// Reads the pixel dimensions of a registered image
fn image_dimensions(path: &str, image: &File) -> Result<(u32, u32), EpubError> {
    let mime = match &image.mime {
        Some(mime) => Some(mime.clone()),
        None => infer_mime(path, &image.binary),
    };

    let dimensions = if mime.as_deref() == Some(SVG_MIME) {
        svg_dimensions(&image.binary)?
    } else {
        let reader = ImageReader::new(Cursor::new(&image.binary)).with_guessed_format()?;
        match reader.format() {
            Some(_) => Some(reader.into_dimensions()?),
            None => None,
        }
    };

    dimensions.ok_or_else(|| {
        EpubBuilderError::UnsupportedImage {
            path: path.to_string(),
        }
        .into()
    })
}

/// Reads the dimensions of an SVG document from its root element
///
/// Explicit `width` and `height` attributes win over the `viewBox`.
/// Percentages can not be resolved and are ignored.
fn svg_dimensions(binary: &[u8]) -> Result<Option<(u32, u32)>, EpubError> {
    let mut reader = Reader::from_reader(binary);

    loop {
        match reader.read_event()? {
            Event::Start(element) | Event::Empty(element) => {
                let mut width = None;
                let mut height = None;
                let mut view_box = None;

                for attr in element.attributes() {
                    let attr = attr?;
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    match attr.key.local_name().as_ref() {
                        b"width" => width = parse_length(&value),
                        b"height" => height = parse_length(&value),
                        b"viewBox" => view_box = parse_view_box(&value),
                        _ => {}
                    }
                }

                return Ok(match (width, height, view_box) {
                    (Some(width), Some(height), _) => Some((width, height)),
                    (_, _, Some(view_box)) => Some(view_box),
                    _ => None,
                });
            }

            Event::Eof => return Ok(None),

            _ => {}
        }
    }
}

/// Parses an SVG length such as `600` or `600px`
fn parse_length(value: &str) -> Option<u32> {
    let value = value.trim();
    let number_end = value
        .find(|char: char| !(char.is_ascii_digit() || char == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(number_end);

    if unit.trim() == "%" {
        return None;
    }

    let number = number.parse::<f64>().ok()?;
    (number > 0.0).then(|| number.round() as u32)
}

/// Parses the size part of a `viewBox="min-x min-y width height"` attribute
fn parse_view_box(value: &str) -> Option<(u32, u32)> {
    let numbers = value
        .split(|char: char| char.is_whitespace() || char == ',')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;

    match numbers.as_slice() {
        [_, _, width, height] if *width > 0.0 && *height > 0.0 => {
            Some((width.round() as u32, height.round() as u32))
        }
        _ => None,
    }
}

fn make_image_xhtml(
    href: &str,
    width: u32,
    height: u32,
    language: &str,
) -> Result<Vec<u8>, EpubError> {
    let width = width.to_string();
    let height = height.to_string();
    let view_box = format!("0 0 {} {}", width, height);

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
        ("xmlns", XHTML_NAMESPACE),
        ("xmlns:epub", OPS_NAMESPACE),
        ("xml:lang", language),
        ("lang", language),
    ])))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    writer.write_event(Event::Start(BytesStart::new("title")))?;
    writer.write_event(Event::Text(BytesText::new("Cover")))?;
    writer.write_event(Event::End(BytesEnd::new("title")))?;
    writer.write_event(Event::Empty(BytesStart::new("meta").with_attributes([
        ("name", "viewport"),
        ("content", format!("width={}, height={}", width, height).as_str()),
    ])))?;
    writer.write_event(Event::Start(
        BytesStart::new("style").with_attributes([("type", "text/css")]),
    ))?;
    writer.write_event(Event::Text(BytesText::new(
        "body { margin: 0; padding: 0; text-align: center; } svg { height: 100%; }",
    )))?;
    writer.write_event(Event::End(BytesEnd::new("style")))?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(
        BytesStart::new("body").with_attributes([("epub:type", "cover")]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("svg").with_attributes([
        ("xmlns", SVG_NAMESPACE),
        ("xmlns:xlink", XLINK_NAMESPACE),
        ("version", "1.1"),
        ("width", "100%"),
        ("height", "100%"),
        ("viewBox", view_box.as_str()),
        ("preserveAspectRatio", "xMidYMid meet"),
    ])))?;
    writer.write_event(Event::Empty(BytesStart::new("image").with_attributes([
        ("width", width.as_str()),
        ("height", height.as_str()),
        ("xlink:href", href),
    ])))?;
    writer.write_event(Event::End(BytesEnd::new("svg")))?;
    writer.write_event(Event::End(BytesEnd::new("body")))?;

    writer.write_event(Event::End(BytesEnd::new("html")))?;

    Ok(writer.into_inner().into_inner())
}
