//! In-memory PDF merge with lopdf.
//!
//! Every input is renumbered into its own object-id range, its pages are
//! collected in document order, and a fresh page tree and catalog are built
//! over them. Attributes a page inherits from its original page tree
//! (`Resources`, `MediaBox`, `CropBox`, `Rotate`) are copied onto the page
//! itself, since the old tree nodes are discarded.

use super::PdfMerger;
use crate::error::TransformFailure;
use async_trait::async_trait;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::{debug, info};

const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against `Parent` cycles in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Structural objects rebuilt for the merged document.
const DISCARDED_TYPES: [&[u8]; 5] = [b"Catalog", b"Pages", b"Page", b"Outlines", b"Outline"];

/// [`PdfMerger`] running lopdf on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfMerger;

#[async_trait]
impl PdfMerger for LopdfMerger {
    async fn merge(&self, inputs: Vec<Vec<u8>>) -> Result<Vec<u8>, TransformFailure> {
        tokio::task::spawn_blocking(move || merge_documents(&inputs))
            .await
            .map_err(|e| TransformFailure::unknown(format!("merge task failed: {e}")))?
    }
}

/// Merge PDF buffers into one document; page order follows input order.
pub fn merge_documents(inputs: &[Vec<u8>]) -> Result<Vec<u8>, TransformFailure> {
    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (index, bytes) in inputs.iter().enumerate() {
        let mut doc = Document::load_mem(bytes)
            .map_err(|e| TransformFailure::corrupt(format!("file {}: {}", index + 1, e)))?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(TransformFailure::corrupt(format!(
                "file {} has no pages",
                index + 1
            )));
        }
        debug!("Input {}: {} page(s)", index + 1, page_ids.len());

        for page_id in page_ids {
            let page = flatten_page(&doc, page_id).map_err(|e| {
                TransformFailure::corrupt(format!("file {}: {}", index + 1, e))
            })?;
            pages.push((page_id, page));
        }

        objects.extend(doc.objects.into_iter().filter(|(_, object)| {
            !object
                .type_name()
                .map(|name| DISCARDED_TYPES.iter().any(|t| *t == name))
                .unwrap_or(false)
        }));
    }

    let mut merged = Document::with_version("1.5");
    merged.objects = objects;
    merged.max_id = next_id;

    let pages_id = merged.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let page_count = kids.len() as i64;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    merged.prune_objects();
    merged.renumber_objects();
    merged.compress();

    let mut out = Vec::new();
    merged
        .save_to(&mut out)
        .map_err(|e| TransformFailure::unknown(format!("could not write merged PDF: {e}")))?;

    info!(
        "Merged {} documents into {} pages ({} bytes)",
        inputs.len(),
        page_count,
        out.len()
    );
    Ok(out)
}

/// Clone a page dictionary with inherited attributes made explicit.
fn flatten_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary, lopdf::Error> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    let mut depth = 0;
    while let Some(node_id) = parent {
        if depth == MAX_TREE_DEPTH {
            break;
        }
        depth += 1;

        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(page)
}
