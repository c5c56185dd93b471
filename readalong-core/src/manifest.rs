use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::region::{Region, Sentence, SentenceId};

pub const BOTTOM_LEFT_ORIGIN: &str = "bottom-left";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode manifest")]
    Decode(#[from] serde_json::Error),
    #[error("unsupported coordinate origin `{0}`; only `bottom-left` is understood")]
    UnsupportedOrigin(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestOptions {
    pub merge_adjacent_regions: bool,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub sentences: Vec<Sentence>,
    /// Document to render, resolved against the manifest's directory.
    pub document: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    sentences: Vec<RawSentence>,
    #[serde(default, alias = "pdfUrl")]
    pdf_url: Option<String>,
    #[serde(default, alias = "pdfPath")]
    pdf_path: Option<PathBuf>,
    #[serde(default)]
    origin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSentence {
    id: SentenceId,
    text: String,
    #[serde(default, alias = "bboxes")]
    regions: Vec<RawRegion>,
}

#[derive(Debug, Deserialize)]
struct RawRegion {
    page: u32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    #[serde(alias = "pageWidth")]
    page_width: f32,
    #[serde(alias = "pageHeight")]
    page_height: f32,
    #[serde(default)]
    is_newline: bool,
}

impl RawRegion {
    fn into_region(self) -> Region {
        Region {
            page: self.page,
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            page_width: self.page_width,
            page_height: self.page_height,
        }
    }
}

impl Manifest {
    #[instrument(skip(options))]
    pub fn load(path: &Path, options: ManifestOptions) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&raw, base, options)
    }

    pub fn from_json(
        raw: &str,
        base_dir: &Path,
        options: ManifestOptions,
    ) -> Result<Self, ManifestError> {
        let manifest: RawManifest = serde_json::from_str(raw)?;

        if let Some(origin) = manifest.origin.as_deref() {
            if origin != BOTTOM_LEFT_ORIGIN {
                return Err(ManifestError::UnsupportedOrigin(origin.to_owned()));
            }
        }

        let document = resolve_document(base_dir, manifest.pdf_path, manifest.pdf_url);
        let mut region_total = 0;
        let sentences: Vec<Sentence> = manifest
            .sentences
            .into_iter()
            .map(|raw| {
                let regions: Vec<Region> = raw
                    .regions
                    .into_iter()
                    .filter(|region| !region.is_newline)
                    .map(RawRegion::into_region)
                    .collect();
                let regions = if options.merge_adjacent_regions {
                    merge_line_regions(&regions)
                } else {
                    regions
                };
                region_total += regions.len();
                Sentence::new(raw.id, raw.text, regions)
            })
            .collect();

        debug!(
            sentences = sentences.len(),
            regions = region_total,
            document = ?document,
            "decoded manifest"
        );
        Ok(Self {
            sentences,
            document,
        })
    }
}

fn resolve_document(
    base_dir: &Path,
    pdf_path: Option<PathBuf>,
    pdf_url: Option<String>,
) -> Option<PathBuf> {
    if let Some(path) = pdf_path {
        return Some(if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        });
    }
    // URLs are relative to the upload root, which is the manifest directory.
    let url = pdf_url?;
    let relative = url.trim_start_matches('/');
    if relative.is_empty() {
        return None;
    }
    Some(base_dir.join(relative))
}

/// Merges consecutive boxes that sit on the same line of the same page.
pub fn merge_line_regions(regions: &[Region]) -> Vec<Region> {
    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if same_line(last, region) => {
                let right = (last.x + last.width).max(region.x + region.width);
                let top = (last.y + last.height).max(region.y + region.height);
                last.x = last.x.min(region.x);
                last.y = last.y.min(region.y);
                last.width = right - last.x;
                last.height = top - last.y;
            }
            _ => merged.push(*region),
        }
    }
    merged
}

fn same_line(line: &Region, next: &Region) -> bool {
    if line.page != next.page
        || line.page_width != next.page_width
        || line.page_height != next.page_height
    {
        return false;
    }
    let tolerance = line.height.max(next.height) * 0.5;
    let line_mid = line.y + line.height / 2.0;
    let next_mid = next.y + next.height / 2.0;
    if (line_mid - next_mid).abs() > tolerance {
        return false;
    }
    let gap = next.x - (line.x + line.width);
    gap >= -tolerance && gap <= line.height.max(next.height) * 1.5
}
