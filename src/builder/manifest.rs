//! Manifest Builder
//!
//! Turns the file registry into the ordered list of manifest items of the
//! package document. Every item receives an id derived from its path, unique
//! across the whole package document, and items taking part in a fallback
//! chain are emitted only after the item they fall back to.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{
    builder::Files,
    error::{EpubBuilderError, EpubError},
    types::File,
    utils::{infer_mime, lookup_path, xml_identify},
};

/// Allocator of the ids used in a package document
///
/// The first request for a candidate gets the candidate itself; later requests
/// get `candidate_1`, `candidate_2`, ... in request order.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    pub(crate) fn allocate(&mut self, candidate: &str) -> String {
        if self.used.insert(candidate.to_string()) {
            return candidate.to_string();
        }

        // `used` is finite, so one of the suffixed candidates is always free
        let mut index = 1;
        loop {
            let id = format!("{}_{}", candidate, index);
            if self.used.insert(id.clone()) {
                return id;
            }
            index += 1;
        }
    }
}

/// A resolved `<item>` of the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ManifestItem {
    pub(crate) id: String,
    pub(crate) href: String,
    pub(crate) mime: String,

    /// Id of the fallback item
    pub(crate) fallback: Option<String>,
    pub(crate) properties: Option<String>,
}

impl ManifestItem {
    pub(crate) fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attributes = vec![
            ("id", self.id.as_str()),
            ("href", self.href.as_str()),
            ("media-type", self.mime.as_str()),
        ];

        if let Some(fallback) = &self.fallback {
            attributes.push(("fallback", fallback.as_str()));
        }
        if let Some(properties) = &self.properties {
            attributes.push(("properties", properties.as_str()));
        }

        attributes
    }
}

/// The ordered manifest, with a path index used to resolve references
#[derive(Debug, Default)]
pub(crate) struct Manifest {
    items: Vec<ManifestItem>,
    by_path: HashMap<String, usize>,
}

impl Manifest {
    /// Builds the manifest items of all registered files
    ///
    /// ## Parameters
    /// - `files`: The file registry
    /// - `cover_paths`: Paths referenced by cover metadata, marked with `cover-image`
    /// - `ids`: The id allocator of the package document
    ///
    /// ## Return
    /// - `Err(EpubError)`: A fallback target is not registered, the fallback
    ///   relationships form a cycle, or the media type of a file is unknown
    pub(crate) fn build(
        files: &Files,
        cover_paths: &HashSet<String>,
        ids: &mut IdAllocator,
    ) -> Result<Self, EpubError> {
        let mut manifest = Manifest::default();
        let mut pending = files.iter().collect::<Vec<_>>();

        while !pending.is_empty() {
            let before = pending.len();
            let mut remaining = Vec::new();

            for (path, file) in pending {
                let fallback = match &file.fallback {
                    Some(target) => match manifest.id_of(target) {
                        Some(id) => Some(id.to_string()),
                        None => {
                            remaining.push((path, file));
                            continue;
                        }
                    },
                    None => None,
                };

                let mime = match &file.mime {
                    Some(mime) => mime.clone(),
                    None => infer_mime(path, &file.binary).ok_or_else(|| {
                        EpubBuilderError::UnknownFileFormat {
                            file_path: path.to_string(),
                        }
                    })?,
                };

                let mut properties = file.properties.clone();
                if cover_paths.contains(path.as_str()) {
                    properties = match properties {
                        Some(properties) => Some(format!("{} cover-image", properties)),
                        None => Some("cover-image".to_string()),
                    };
                }

                manifest.push(ManifestItem {
                    id: ids.allocate(&xml_identify(path)),
                    href: path.to_string(),
                    mime,
                    fallback,
                    properties,
                });
            }

            if remaining.len() == before {
                return Err(Self::stalled_fallback_error(files, &remaining));
            }

            pending = remaining;
        }

        debug!("built {} manifest items for registered files", manifest.len());
        Ok(manifest)
    }

    /// Appends the item of a document generated at write time
    pub(crate) fn push_generated(
        &mut self,
        path: &str,
        mime: &str,
        properties: Option<&str>,
        ids: &mut IdAllocator,
    ) -> &ManifestItem {
        let id = ids.allocate(&xml_identify(path));
        self.push(ManifestItem {
            id,
            href: path.to_string(),
            mime: mime.to_string(),
            fallback: None,
            properties: properties.map(str::to_string),
        })
    }

    /// Returns the id of the item registered under `path`
    ///
    /// `path` is normalized the way the registry normalizes its keys.
    pub(crate) fn id_of(&self, path: &str) -> Option<&str> {
        self.by_path
            .get(&lookup_path(path))
            .map(|&index| self.items[index].id.as_str())
    }

    pub(crate) fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    fn push(&mut self, item: ManifestItem) -> &ManifestItem {
        let index = self.items.len();
        self.by_path.insert(item.href.clone(), index);
        self.items.push(item);
        &self.items[index]
    }

    /// Explains why the remaining files can never be emitted
    ///
    /// Every remaining file has a fallback that has not been emitted. Either a
    /// target was never registered, or all targets are remaining files too, in
    /// which case following the fallbacks must run into a cycle.
    fn stalled_fallback_error(files: &Files, remaining: &[(&String, &File)]) -> EpubError {
        for (_, file) in remaining {
            if let Some(target) = &file.fallback {
                if !files.contains(target) {
                    return EpubBuilderError::ManifestNotFound {
                        path: target.to_string(),
                    }
                    .into();
                }
            }
        }

        let mut chain: Vec<String> = Vec::new();
        let mut current = remaining.first().map(|(path, _)| path.to_string());

        while let Some(path) = current {
            if let Some(start) = chain.iter().position(|visited| *visited == path) {
                chain.push(path);
                return EpubBuilderError::ManifestCircularReference {
                    fallback_chain: chain[start..].join("->"),
                }
                .into();
            }

            current = files
                .get(&path)
                .and_then(|file| file.fallback.as_deref())
                .map(lookup_path);
            chain.push(path);
        }

        // unreachable for a consistent registry; report the first stuck file
        EpubBuilderError::ManifestCircularReference {
            fallback_chain: chain.join("->"),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::{
        builder::{
            Files,
            manifest::{IdAllocator, Manifest},
        },
        error::{EpubBuilderError, EpubError},
        types::File,
    };

    fn xhtml() -> File {
        File::new(b"<html/>".to_vec())
    }

    #[test]
    fn test_id_allocator() {
        let mut ids = IdAllocator::default();

        assert_eq!(ids.allocate("pub-id"), "pub-id");
        assert_eq!(ids.allocate("pub-id"), "pub-id_1");
        assert_eq!(ids.allocate("pub-id"), "pub-id_2");
        assert_eq!(ids.allocate("other"), "other");
    }

    /// A natural id that looks like a suffixed one must not be handed out twice
    #[test]
    fn test_id_allocator_suffix_taken() {
        let mut ids = IdAllocator::default();

        assert_eq!(ids.allocate("a_1"), "a_1");
        assert_eq!(ids.allocate("a"), "a");
        assert_eq!(ids.allocate("a"), "a_2");
    }

    #[test]
    fn test_build_manifest_ids() {
        let mut files = Files::new();
        files.insert("text/a b.xhtml", xhtml()).unwrap();
        files.insert("text/a:b.xhtml", xhtml()).unwrap();
        files.insert("1.xhtml", xhtml()).unwrap();

        let manifest = Manifest::build(&files, &HashSet::new(), &mut IdAllocator::default());
        let manifest = manifest.unwrap();

        assert_eq!(manifest.id_of("text/a b.xhtml"), Some("text:a:b.xhtml"));
        assert_eq!(manifest.id_of("text/a:b.xhtml"), Some("text:a:b.xhtml_1"));
        assert_eq!(manifest.id_of("1.xhtml"), Some("P_1.xhtml"));
        assert_eq!(manifest.items()[0].mime, "application/xhtml+xml");
    }

    /// Items are emitted after their fallback target, whatever the registration order
    #[test]
    fn test_build_manifest_fallback_order() {
        let mut files = Files::new();
        files
            .insert("item1.dat", xhtml().with_mime("x/one").with_fallback("item2.dat"))
            .unwrap();
        files
            .insert("item2.dat", xhtml().with_mime("x/two").with_fallback("item3.xhtml"))
            .unwrap();
        files.insert("item3.xhtml", xhtml()).unwrap();

        let manifest = Manifest::build(&files, &HashSet::new(), &mut IdAllocator::default());
        let manifest = manifest.unwrap();

        let hrefs = manifest
            .items()
            .iter()
            .map(|item| item.href.as_str())
            .collect::<Vec<_>>();
        assert_eq!(hrefs, vec!["item3.xhtml", "item2.dat", "item1.dat"]);

        assert_eq!(manifest.items()[1].fallback.as_deref(), Some("item3.xhtml"));
        assert_eq!(manifest.items()[2].fallback.as_deref(), Some("item2.dat"));
    }

    #[test]
    fn test_build_manifest_fallback_not_found() {
        let mut files = Files::new();
        files
            .insert("item1.xhtml", xhtml().with_fallback("nonexistent.xhtml"))
            .unwrap();

        let result = Manifest::build(&files, &HashSet::new(), &mut IdAllocator::default());
        assert_eq!(
            result.unwrap_err(),
            EpubError::from(EpubBuilderError::ManifestNotFound {
                path: "nonexistent.xhtml".to_string()
            })
        );
    }

    #[test]
    fn test_build_manifest_fallback_circular_reference() {
        let mut files = Files::new();
        files.insert("ok.xhtml", xhtml()).unwrap();
        files
            .insert("item1.xhtml", xhtml().with_fallback("item2.xhtml"))
            .unwrap();
        files
            .insert("item2.xhtml", xhtml().with_fallback("item1.xhtml"))
            .unwrap();

        let result = Manifest::build(&files, &HashSet::new(), &mut IdAllocator::default());
        let err = result.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Epub builder error: Circular reference detected in fallback chain for 'item1.xhtml->item2.xhtml->item1.xhtml'."
        );
    }

    #[test]
    fn test_build_manifest_self_fallback() {
        let mut files = Files::new();
        files
            .insert("loop.xhtml", xhtml().with_fallback("loop.xhtml"))
            .unwrap();

        let result = Manifest::build(&files, &HashSet::new(), &mut IdAllocator::default());
        assert_eq!(
            result.unwrap_err(),
            EpubError::from(EpubBuilderError::ManifestCircularReference {
                fallback_chain: "loop.xhtml->loop.xhtml".to_string()
            })
        );
    }

    #[test]
    fn test_build_manifest_unknown_format() {
        let mut files = Files::new();
        files.insert("notes", File::new(b"plain words".to_vec())).unwrap();

        let result = Manifest::build(&files, &HashSet::new(), &mut IdAllocator::default());
        assert_eq!(
            result.unwrap_err(),
            EpubError::from(EpubBuilderError::UnknownFileFormat {
                file_path: "notes".to_string()
            })
        );
    }

    #[test]
    fn test_build_manifest_cover_property() {
        let mut files = Files::new();
        files
            .insert(
                "cover.png",
                File::new(vec![0x89, b'P', b'N', b'G']).append_property("custom"),
            )
            .unwrap();

        let covers = HashSet::from(["cover.png".to_string()]);
        let manifest = Manifest::build(&files, &covers, &mut IdAllocator::default()).unwrap();

        assert_eq!(
            manifest.items()[0].properties.as_deref(),
            Some("custom cover-image")
        );
        assert_eq!(manifest.items()[0].mime, "image/png");
    }

    #[test]
    fn test_push_generated_avoids_file_ids() {
        let mut files = Files::new();
        files.insert("nav.xhtml", xhtml()).unwrap();

        let mut ids = IdAllocator::default();
        let mut manifest = Manifest::build(&files, &HashSet::new(), &mut ids).unwrap();
        let item = manifest.push_generated(
            "nav_1.xhtml",
            "application/xhtml+xml",
            Some("nav"),
            &mut ids,
        );

        assert_eq!(item.id, "nav_1.xhtml");
        assert_eq!(
            item.attributes(),
            vec![
                ("id", "nav_1.xhtml"),
                ("href", "nav_1.xhtml"),
                ("media-type", "application/xhtml+xml"),
                ("properties", "nav"),
            ]
        );
        assert_eq!(manifest.len(), 2);
    }
}
