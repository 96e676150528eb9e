// src/infrastructure/pdf.rs
use crate::application::{ExtractedDocument, ExtractedImage, PdfExtractor};
use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Page tree levels walked when looking for inherited resources.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Where embedded images go, and how big they must be to be kept.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImageOutput {
    dir: PathBuf,
    min_width: u32,
    min_height: u32,
}

impl ImageOutput {
    fn accepts(&self, width: u32, height: u32) -> bool {
        width >= self.min_width && height >= self.min_height
    }
}

/// Page text through `pdf-extract`. Embedded raster images are written out
/// through `lopdf` once [`TextPdfExtractor::with_images`] is set.
#[derive(Debug, Default, Clone)]
pub struct TextPdfExtractor {
    images: Option<ImageOutput>,
}

impl TextPdfExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write images of at least `min_width` x `min_height` pixels into `dir` as PNG.
    pub fn with_images(mut self, dir: &Path, min_width: u32, min_height: u32) -> Self {
        self.images = Some(ImageOutput {
            dir: dir.to_path_buf(),
            min_width,
            min_height,
        });
        self
    }
}

impl PdfExtractor for TextPdfExtractor {
    #[instrument(level = "debug", skip(self))]
    fn extract(&self, pdf: &Path, unit_name: &str) -> Result<ExtractedDocument> {
        let bytes =
            fs::read(pdf).with_context(|| format!("Failed to read PDF: {}", pdf.display()))?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| anyhow::anyhow!("Failed to extract text from {}: {}", pdf.display(), e))?;

        let pages = split_pages(&text);
        let images = match &self.images {
            Some(output) => {
                let doc = Document::load_mem(&bytes)
                    .with_context(|| format!("Failed to parse PDF objects: {}", pdf.display()))?;
                write_images(&doc, unit_name, output)?
            }
            None => vec![],
        };
        debug!(pages = pages.len(), images = images.len(), "Extracted PDF");
        Ok(ExtractedDocument { pages, images })
    }
}

/// Split extracted text on form feeds, one entry per page.
fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\x0C').map(|p| p.trim().to_string()).collect();
    // A trailing form feed leaves one empty tail
    if pages.len() > 1 && pages.last().is_some_and(|p| p.is_empty()) {
        pages.pop();
    }
    pages
}

/// `unit_1_page03_img02.png`: page and running image number, both 1-based.
fn image_filename(unit_name: &str, page: u32, index: usize) -> String {
    format!("{}_page{:02}_img{:02}.png", unit_name, page, index)
}

/// Write every large enough image in page order. A single undecodable image is
/// skipped with a warning.
fn write_images(doc: &Document, unit_name: &str, output: &ImageOutput) -> Result<Vec<ExtractedImage>> {
    fs::create_dir_all(&output.dir)
        .with_context(|| format!("Failed to create images directory: {}", output.dir.display()))?;

    let mut images = Vec::new();
    for (page, page_id) in doc.get_pages() {
        for (name, stream) in page_images(doc, page_id) {
            let Some((width, height)) = image_dimensions(stream) else {
                debug!(page, image = %name, "Image without dimensions");
                continue;
            };
            if !output.accepts(width, height) {
                debug!(page, image = %name, width, height, "Skipping small image");
                continue;
            }
            let Some(decoded) = decode_image(stream, width, height) else {
                debug!(page, image = %name, "Unsupported image encoding");
                continue;
            };

            let filename = image_filename(unit_name, page, images.len() + 1);
            let path = output.dir.join(&filename);
            match decoded.save_with_format(&path, ImageFormat::Png) {
                Ok(()) => {
                    debug!(page, image = %filename, width, height, "Wrote image");
                    images.push(ExtractedImage {
                        filename,
                        page,
                        bbox: None,
                    });
                }
                Err(e) => warn!(page, image = %name, error = %e, "Failed to write image"),
            }
        }
    }
    Ok(images)
}

/// Image XObjects of one page, each stream once.
fn page_images(doc: &Document, page_id: ObjectId) -> Vec<(String, &Stream)> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|obj| resolve_dict(doc, obj))
    else {
        return vec![];
    };

    let mut seen = BTreeSet::new();
    xobjects
        .iter()
        .filter_map(|(name, obj)| {
            let (id, target) = doc.dereference(obj).ok()?;
            if let Some(id) = id {
                if !seen.insert(id) {
                    return None;
                }
            }
            let stream = target.as_stream().ok()?;
            let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name).ok()?;
            (subtype == b"Image").then(|| (String::from_utf8_lossy(name).into_owned(), stream))
        })
        .collect()
}

/// Page resources, inherited from the page tree when the page carries none.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Some(resources) = node
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_dict(doc, obj))
        {
            return Some(resources);
        }
        let parent = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    doc.dereference(obj).ok()?.1.as_dict().ok()
}

fn image_dimensions(stream: &Stream) -> Option<(u32, u32)> {
    let dim = |key: &[u8]| {
        stream
            .dict
            .get(key)
            .and_then(Object::as_i64)
            .ok()
            .and_then(|v| u32::try_from(v).ok())
    };
    Some((dim(b"Width")?, dim(b"Height")?))
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|f| f.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => vec![],
    }
}

/// JPEG streams and 8-bit gray or RGB samples. Everything else (CCITT, JBIG2,
/// indexed palettes, 1-bit masks) yields `None`.
fn decode_image(stream: &Stream, width: u32, height: u32) -> Option<DynamicImage> {
    let filters = filter_names(stream);
    let samples = match filters.as_slice() {
        [f] if f.as_slice() == b"DCTDecode" => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok();
        }
        [] => stream.content.clone(),
        [f] if f.as_slice() == b"FlateDecode" => stream.decompressed_content().ok()?,
        _ => return None,
    };

    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .ok()?;
    if bits != 8 {
        return None;
    }

    let pixels = width as usize * height as usize;
    if samples.len() == pixels * 3 {
        RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
    } else if samples.len() == pixels {
        GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8)
    } else {
        None
    }
}
