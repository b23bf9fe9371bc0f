//! Navigation Renderer
//!
//! Renders the table of contents tree into the EPUB 3 navigation document,
//! the legacy EPUB 2 NCX file and the in-book table of contents page.

use std::io::Cursor;

use log::{debug, warn};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{
    builder::XmlWriter,
    error::EpubError,
    types::{Section, Toc},
    utils::{NCX_NAMESPACE, OPS_NAMESPACE, XHTML_NAMESPACE},
};

/// Outlines rendered into the navigation document
pub(crate) struct Outlines<'a> {
    pub(crate) toc: &'a Toc,
    pub(crate) landmarks: &'a [Section],
    pub(crate) page_list: &'a [Section],
}

/// Creates the navigation document
///
/// The `toc` nav is always present; the `landmarks` and `page-list` navs are
/// only written when they contain sections.
///
/// ## Parameters
/// - `outlines`: The toc tree and the optional parallel outlines
/// - `title`: Title of the document head
/// - `language`: Language of the document
pub(crate) fn make_navigation_document(
    outlines: &Outlines,
    title: &str,
    language: &str,
) -> Result<Vec<u8>, EpubError> {
    if outlines.toc.is_empty() {
        warn!("The table of contents is empty, the navigation document lists nothing.");
    }

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    make_html_start(&mut writer, title, language)?;
    writer.write_event(Event::Start(BytesStart::new("body")))?;

    writer.write_event(Event::Start(
        BytesStart::new("nav").with_attributes([("epub:type", "toc"), ("id", "toc")]),
    ))?;
    if let Some(toc_title) = &outlines.toc.title {
        make_text_element(&mut writer, "h1", toc_title)?;
    }
    make_nav_list(&mut writer, &outlines.toc.sections, false, false)?;
    writer.write_event(Event::End(BytesEnd::new("nav")))?;

    if !outlines.landmarks.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("nav").with_attributes([
            ("epub:type", "landmarks"),
            ("id", "landmarks"),
        ])))?;
        make_nav_list(&mut writer, outlines.landmarks, false, false)?;
        writer.write_event(Event::End(BytesEnd::new("nav")))?;
    }

    if !outlines.page_list.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("nav").with_attributes([
            ("epub:type", "page-list"),
            ("id", "page-list"),
            ("hidden", "hidden"),
        ])))?;
        make_nav_list(&mut writer, outlines.page_list, false, false)?;
        writer.write_event(Event::End(BytesEnd::new("nav")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("html")))?;

    Ok(writer.into_inner().into_inner())
}

/// Creates an XHTML page listing the table of contents
///
/// Unlike the navigation document, hidden subsection lists are left out of the
/// page entirely, since the page is part of the reading order.
pub(crate) fn make_toc_page(
    toc: &Toc,
    title: &str,
    language: &str,
) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    make_html_start(&mut writer, title, language)?;
    writer.write_event(Event::Start(BytesStart::new("body")))?;
    writer.write_event(Event::Start(
        BytesStart::new("section").with_attributes([("epub:type", "toc")]),
    ))?;

    make_text_element(&mut writer, "h1", title)?;
    make_nav_list(&mut writer, &toc.sections, false, true)?;

    writer.write_event(Event::End(BytesEnd::new("section")))?;
    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("html")))?;

    Ok(writer.into_inner().into_inner())
}

/// Creates the legacy NCX document
///
/// ## Parameters
/// - `toc`: The toc tree
/// - `uid`: Value of the unique identifier of the publication
/// - `title`: The document title
/// - `language`: Language of the document
/// - `max_depth`: Number of levels rendered, at least one; all levels when `None`
pub(crate) fn make_ncx(
    toc: &Toc,
    uid: &str,
    title: &str,
    language: &str,
    max_depth: Option<usize>,
) -> Result<Vec<u8>, EpubError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("ncx").with_attributes([
        ("xmlns", NCX_NAMESPACE),
        ("version", "2005-1"),
        ("xml:lang", language),
    ])))?;

    let max_depth = max_depth.unwrap_or(usize::MAX).max(1);
    let depth = toc.depth().min(max_depth).max(1).to_string();
    writer.write_event(Event::Start(BytesStart::new("head")))?;
    for (name, content) in [
        ("dtb:uid", uid),
        ("dtb:depth", depth.as_str()),
        ("dtb:totalPageCount", "0"),
        ("dtb:maxPageNumber", "0"),
    ] {
        writer.write_event(Event::Empty(
            BytesStart::new("meta").with_attributes([("name", name), ("content", content)]),
        ))?;
    }
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("docTitle")))?;
    make_text_element(&mut writer, "text", title)?;
    writer.write_event(Event::End(BytesEnd::new("docTitle")))?;

    writer.write_event(Event::Start(BytesStart::new("navMap")))?;
    let mut play_order = 0;
    make_nav_points(&mut writer, &toc.sections, max_depth, &mut play_order)?;
    writer.write_event(Event::End(BytesEnd::new("navMap")))?;

    writer.write_event(Event::End(BytesEnd::new("ncx")))?;

    debug!("rendered {} navigation points into the NCX", play_order);
    Ok(writer.into_inner().into_inner())
}

fn make_html_start(writer: &mut XmlWriter, title: &str, language: &str) -> Result<(), EpubError> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("html").with_attributes([
        ("xmlns", XHTML_NAMESPACE),
        ("xmlns:epub", OPS_NAMESPACE),
        ("xml:lang", language),
        ("lang", language),
    ])))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    make_text_element(writer, "title", title)?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    Ok(())
}

fn make_text_element(writer: &mut XmlWriter, tag: &str, text: &str) -> Result<(), EpubError> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;

    Ok(())
}

/// Renders sections as a nested ordered list, depth first
///
/// `hidden` marks the list itself as hidden. When `skip_hidden` is set, lists
/// of subsections marked hidden are not rendered at all.
fn make_nav_list(
    writer: &mut XmlWriter,
    sections: &[Section],
    hidden: bool,
    skip_hidden: bool,
) -> Result<(), EpubError> {
    let mut list = BytesStart::new("ol");
    if hidden {
        list.push_attribute(("hidden", "hidden"));
    }
    writer.write_event(Event::Start(list))?;

    for section in sections {
        writer.write_event(Event::Start(BytesStart::new("li")))?;

        if let Some(href) = &section.href {
            let mut anchor = BytesStart::new("a");
            if let Some(epub_type) = &section.epub_type {
                anchor.push_attribute(("epub:type", epub_type.as_str()));
            }
            anchor.push_attribute(("href", href.as_str()));

            writer.write_event(Event::Start(anchor))?;
            writer.write_event(Event::Text(BytesText::new(section.title.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("a")))?;
        } else {
            make_text_element(writer, "span", &section.title)?;
        }

        let sub_hidden = section.hidden == Some(true);
        if !section.subsections.is_empty() && !(sub_hidden && skip_hidden) {
            make_nav_list(writer, &section.subsections, sub_hidden, skip_hidden)?;
        }

        writer.write_event(Event::End(BytesEnd::new("li")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("ol")))?;

    Ok(())
}

/// Renders sections as nested `navPoint` elements with sequential play order
///
/// A section without href points at its first descendant with one; a subtree
/// without any href is skipped. `levels` counts the levels still to render.
fn make_nav_points(
    writer: &mut XmlWriter,
    sections: &[Section],
    levels: usize,
    play_order: &mut usize,
) -> Result<(), EpubError> {
    for section in sections {
        let Some(src) = section.first_href() else {
            debug!("skipping '{}' in the NCX: no linked section", section.title);
            continue;
        };

        *play_order += 1;
        let id = format!("navPoint-{}", play_order);
        let order = play_order.to_string();

        writer.write_event(Event::Start(BytesStart::new("navPoint").with_attributes([
            ("id", id.as_str()),
            ("playOrder", order.as_str()),
        ])))?;

        writer.write_event(Event::Start(BytesStart::new("navLabel")))?;
        make_text_element(writer, "text", &section.title)?;
        writer.write_event(Event::End(BytesEnd::new("navLabel")))?;

        writer.write_event(Event::Empty(
            BytesStart::new("content").with_attributes([("src", src)]),
        ))?;

        if levels > 1 {
            make_nav_points(writer, &section.subsections, levels - 1, play_order)?;
        }

        writer.write_event(Event::End(BytesEnd::new("navPoint")))?;
    }

    Ok(())
}
