//! PDF merging for reports.
//!
//! Sources are accumulated in order and concatenated page by page into one
//! document on [`PdfMerger::save`]. Parsing and writing are CPU-bound, so the
//! lopdf work runs in `spawn_blocking`.

use crate::error::MergeError;
use async_trait::async_trait;
use lopdf::{Document as PdfDocument, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Accumulates PDF files and writes their concatenation.
#[async_trait]
pub trait PdfMerger: Send {
    fn add_source(&mut self, path: &Path) -> Result<(), MergeError>;

    async fn save(&mut self, output: &Path) -> Result<(), MergeError>;
}

/// [`PdfMerger`] backed by `lopdf`.
#[derive(Debug, Default)]
pub struct LopdfMerger {
    sources: Vec<PathBuf>,
}

impl LopdfMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

#[async_trait]
impl PdfMerger for LopdfMerger {
    fn add_source(&mut self, path: &Path) -> Result<(), MergeError> {
        if !path.is_file() {
            return Err(MergeError::SourceMissing(path.to_path_buf()));
        }
        self.sources.push(path.to_path_buf());
        Ok(())
    }

    async fn save(&mut self, output: &Path) -> Result<(), MergeError> {
        if self.sources.is_empty() {
            return Err(MergeError::Empty);
        }
        let sources = self.sources.clone();
        let target = output.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || merge_files(&sources, &target))
            .await
            .map_err(|e| MergeError::Save {
                path: output.to_path_buf(),
                detail: format!("merge task panicked: {e}"),
            })??;
        info!(
            "Merged {} file(s), {} page(s) into {}",
            self.sources.len(),
            pages,
            output.display()
        );
        Ok(())
    }
}

/// Concatenate `sources` into `output`; returns the page count.
pub fn merge_files(sources: &[PathBuf], output: &Path) -> Result<usize, MergeError> {
    let mut merged = merge_documents(sources)?;
    let page_count = merged.get_pages().len();

    let save_error = |detail: String| MergeError::Save {
        path: output.to_path_buf(),
        detail,
    };
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| save_error(e.to_string()))?;
        }
    }
    merged.save(output).map_err(|e| save_error(e.to_string()))?;
    Ok(page_count)
}

fn type_of(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|name| name.as_name().ok())
}

fn merge_documents(sources: &[PathBuf]) -> Result<PdfDocument, MergeError> {
    // ── Step 1: Load and renumber so object ids never collide ───────────────
    let mut max_id = 1;
    let mut pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for path in sources {
        let mut doc = PdfDocument::load(path).map_err(|e| MergeError::Load {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let doc_pages = doc.get_pages();
        debug!("{}: {} page(s)", path.display(), doc_pages.len());
        for (_, page_id) in doc_pages {
            if let Ok(page) = doc.get_object(page_id) {
                pages.insert(page_id, page.clone());
            }
        }
        objects.extend(doc.objects);
    }

    // ── Step 2: Keep one catalog and one page tree root ─────────────────────
    let mut merged = PdfDocument::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut page_tree: Option<(ObjectId, Object)> = None;

    for (id, object) in objects {
        let kind = type_of(&object).map(<[u8]>::to_vec);
        match kind.as_deref() {
            Some(b"Catalog") => {
                let keep = catalog.as_ref().map_or(id, |(first, _)| *first);
                catalog = Some((keep, object));
            }
            Some(b"Pages") => {
                let Ok(dict) = object.as_dict() else { continue };
                let mut dict = dict.clone();
                if let Some((_, previous)) = &page_tree {
                    if let Ok(previous) = previous.as_dict() {
                        dict.extend(previous);
                    }
                }
                let keep = page_tree.as_ref().map_or(id, |(first, _)| *first);
                page_tree = Some((keep, Object::Dictionary(dict)));
            }
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(id, object);
            }
        }
    }

    let missing = |what: &str| MergeError::Load {
        path: sources.first().cloned().unwrap_or_default(),
        detail: format!("no {what} found in the merged sources"),
    };
    let (tree_id, tree) = page_tree.ok_or_else(|| missing("page tree"))?;
    let (catalog_id, catalog) = catalog.ok_or_else(|| missing("catalog"))?;

    // ── Step 3: Re-parent every page and rebuild the tree ───────────────────
    let page_count = pages.len();
    let mut kids = Vec::with_capacity(page_count);
    for (id, page) in pages {
        if let Ok(dict) = page.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", Object::Reference(tree_id));
            merged.objects.insert(id, Object::Dictionary(dict));
            kids.push(Object::Reference(id));
        }
    }

    if let Ok(dict) = tree.as_dict() {
        let mut dict = dict.clone();
        dict.set("Count", Object::Integer(kids.len() as i64));
        dict.set("Kids", Object::Array(kids));
        merged.objects.insert(tree_id, Object::Dictionary(dict));
    }
    if let Ok(dict) = catalog.as_dict() {
        let mut dict = dict.clone();
        dict.set("Pages", Object::Reference(tree_id));
        dict.remove(b"Outlines");
        merged.objects.insert(catalog_id, Object::Dictionary(dict));
    }
    merged.trailer.set("Root", Object::Reference(catalog_id));

    // ── Step 4: Compact ─────────────────────────────────────────────────────
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.adjust_zero_pages();
    merged.compress();
    Ok(merged)
}
