
use std::fs;
use std::path::{Path, PathBuf};

use docx_rust::DocxFile;
use docx_rust::document::{BodyContent, ParagraphContent, RunContent};
use tracing::{debug, warn};

use crate::chunker::{Chunk, chunk_text};
use crate::config::{
    CODE_EXTENSIONS, Config, DOCX_EXTENSIONS, INDEX_DIR_NAME, INSTRUCTIONS_FILE_NAME,
    PDF_EXTENSIONS, TEXT_EXTENSIONS,
};
use crate::{RagError, Result};

/// Result of loading a folder: the chunks produced plus per-file warnings.
///
/// A file that cannot be read or decoded is skipped with a warning; it never
/// aborts the run.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub chunks: Vec<Chunk>,
    pub warnings: Vec<String>,
}

/// Loads and chunks every supported document under a folder.
pub struct DocumentLoader {
    folder: PathBuf,
    config: Config,
}

impl DocumentLoader {
    #[inline]
    pub fn new<P: AsRef<Path>>(folder: P, config: Config) -> Self {
        Self {
            folder: folder.as_ref().to_path_buf(),
            config,
        }
    }

    /// Load all supported documents under the folder, chunked and ready for
    /// embedding. Chunks are ordered by source path, then window position.
    #[inline]
    pub fn load_all(&self) -> Result<LoadReport> {
        let mut files = Vec::new();
        self.collect_files(&self.folder, &mut files)?;
        files.sort();

        let mut report = LoadReport::default();
        for path in files {
            match self.load_file(&path) {
                Ok(chunks) => report.chunks.extend(chunks),
                Err(e) => {
                    let message = format!("Skipping {}: {}", path.display(), e);
                    warn!("{}", message);
                    report.warnings.push(message);
                }
            }
        }

        debug!(
            "Loaded {} chunks from {} ({} files skipped)",
            report.chunks.len(),
            self.folder.display(),
            report.warnings.len()
        );
        Ok(report)
    }

    fn collect_files(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| {
            RagError::Document(format!("Failed to read directory {}: {}", dir.display(), e))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                RagError::Document(format!("Failed to read entry in {}: {}", dir.display(), e))
            })?;
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if path.is_dir() {
                // Never descend into the vector index or hidden directories.
                if name == INDEX_DIR_NAME || name.starts_with('.') {
                    continue;
                }
                self.collect_files(&path, files)?;
            } else if let Some(ext) = extension_of(&path) {
                if Config::is_supported_extension(&ext) {
                    files.push(path);
                }
            }
        }

        Ok(())
    }

    fn load_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let ext = extension_of(path)
            .ok_or_else(|| RagError::Document("File has no extension".to_string()))?;

        let content = if TEXT_EXTENSIONS.contains(&ext.as_str())
            || CODE_EXTENSIONS.contains(&ext.as_str())
        {
            load_text_file(path)?
        } else if PDF_EXTENSIONS.contains(&ext.as_str()) {
            load_pdf_file(path)?
        } else if DOCX_EXTENSIONS.contains(&ext.as_str()) {
            load_docx_file(path)?
        } else {
            return Err(RagError::Document(format!(
                "Unsupported file type: .{ext}"
            )));
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let source = path
            .strip_prefix(&self.folder)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        Ok(chunk_text(&content, &source, &ext, &self.config))
    }
}

/// Read the optional `instructions.txt` from the folder root.
#[inline]
pub fn load_instructions<P: AsRef<Path>>(folder: P) -> Option<String> {
    let path = folder.as_ref().join(INSTRUCTIONS_FILE_NAME);
    if !path.exists() {
        return None;
    }
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            None
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

fn load_text_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .map_err(|e| RagError::Document(format!("Failed to read file: {e}")))?;

    // Accept anything that decodes as UTF-8; fall back to lossy decoding for
    // legacy encodings rather than skipping the file.
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn load_pdf_file(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| RagError::Document(format!("Failed to parse PDF: {e}")))?;

    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut parts = Vec::with_capacity(pages.len());
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(text) if !text.trim().is_empty() => parts.push(text),
            Ok(_) => {}
            Err(e) => debug!("No text extracted from page {} of {}: {}", page, path.display(), e),
        }
    }

    Ok(parts.join("\n\n"))
}

fn load_docx_file(path: &Path) -> Result<String> {
    let file = DocxFile::from_file(path)
        .map_err(|e| RagError::Document(format!("Failed to open DOCX: {e:?}")))?;
    let docx = file
        .parse()
        .map_err(|e| RagError::Document(format!("Failed to parse DOCX: {e:?}")))?;

    let mut parts = Vec::new();
    for content in &docx.document.body.content {
        if let BodyContent::Paragraph(paragraph) = content {
            let mut text = String::new();
            for item in &paragraph.content {
                if let ParagraphContent::Run(run) = item {
                    for piece in &run.content {
                        if let RunContent::Text(t) = piece {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            if !text.trim().is_empty() {
                parts.push(text);
            }
        }
    }

    Ok(parts.join("\n\n"))
}
