// Retrieval orchestrator
// Ties loading, chunking, embedding, storage, retrieval, and generation together


use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::embeddings::{EmbeddingProvider, embedding_provider};
use crate::llm::{GenerationProvider, TokenStream, generation_provider};
use crate::loader::{DocumentLoader, load_instructions};
use crate::store::{ChunkRecord, SearchResult, VectorStore};
use crate::{RagError, Result};

/// Outcome of one indexing run.
#[derive(Debug)]
pub struct IndexReport {
    /// Number of chunks embedded and persisted.
    pub chunks_indexed: usize,
    /// Per-file problems that were skipped over, for display.
    pub warnings: Vec<String>,
}

/// The RAG pipeline for one folder.
///
/// Holds the folder's vector store, an embedding provider, and a generation
/// provider. The store is bound to the embedding provider's dimension, so
/// switching embedding providers requires reindexing.
pub struct RagEngine {
    folder: PathBuf,
    config: Config,
    embedding: Box<dyn EmbeddingProvider>,
    generation: Box<dyn GenerationProvider>,
    store: VectorStore,
    instructions: Option<String>,
}

impl RagEngine {
    /// Build an engine with the configured default providers.
    #[inline]
    pub async fn new<P: AsRef<Path>>(folder: P, config: Config) -> Result<Self> {
        let llm_id = config.default_llm.clone();
        let embedding_id = config.default_embedding.clone();
        Self::with_provider_ids(folder, config, &llm_id, &embedding_id).await
    }

    /// Build an engine with explicitly selected provider ids.
    #[inline]
    pub async fn with_provider_ids<P: AsRef<Path>>(
        folder: P,
        config: Config,
        llm_id: &str,
        embedding_id: &str,
    ) -> Result<Self> {
        let embedding = embedding_provider(embedding_id, &config)?;
        let generation = generation_provider(llm_id, &config)?;
        Self::with_providers(folder, config, embedding, generation).await
    }

    /// Build an engine around caller-supplied providers.
    ///
    /// The config is validated here, so every constructor path rejects
    /// invalid chunking or retrieval settings before any folder I/O.
    #[inline]
    pub async fn with_providers<P: AsRef<Path>>(
        folder: P,
        config: Config,
        embedding: Box<dyn EmbeddingProvider>,
        generation: Box<dyn GenerationProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let folder = folder.as_ref().to_path_buf();
        let store = VectorStore::open(&folder, embedding.dimension()).await?;
        let instructions = load_instructions(&folder);

        Ok(Self {
            folder,
            config,
            embedding,
            generation,
            store,
            instructions,
        })
    }

    /// Index every supported document in the folder.
    ///
    /// Indexing fully replaces any previous index contents. With `rebuild`
    /// the store is cleared up front; otherwise a non-empty store is cleared
    /// only once the folder is known to contain documents, so an accidental
    /// run against an empty folder never destroys an existing index.
    #[inline]
    pub async fn index(&self, rebuild: bool) -> Result<IndexReport> {
        if rebuild {
            self.store.clear().await?;
        }

        let loader = DocumentLoader::new(&self.folder, self.config.clone());
        let report = loader.load_all()?;

        if report.chunks.is_empty() {
            info!("No documents found in {}", self.folder.display());
            return Ok(IndexReport {
                chunks_indexed: 0,
                warnings: report.warnings,
            });
        }

        if !rebuild && self.store.count().await? > 0 {
            self.store.clear().await?;
        }

        debug!("Embedding {} chunks", report.chunks.len());
        let texts: Vec<String> = report
            .chunks
            .iter()
            .map(|chunk| chunk.content.clone())
            .collect();
        let embeddings = self.embedding.embed_many(&texts)?;

        let records: Vec<ChunkRecord> = report
            .chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                id: chunk.id(),
                embedding,
                content: chunk.content.clone(),
                source: chunk.source.clone(),
                chunk_index: chunk.chunk_index,
                file_type: chunk.file_type.clone(),
            })
            .collect();

        self.store.add(&records).await?;
        info!(
            "Indexed {} chunks from {}",
            records.len(),
            self.folder.display()
        );

        Ok(IndexReport {
            chunks_indexed: records.len(),
            warnings: report.warnings,
        })
    }

    /// Answer a question in one shot. `top_k` overrides the configured
    /// retrieval count for this query only.
    #[inline]
    pub async fn query(&self, question: &str, top_k: Option<usize>) -> Result<String> {
        let prompt = self.prepare_prompt(question, top_k).await?;
        self.generation
            .generate(&prompt, Some(&self.build_system_prompt()))
            .await
    }

    /// Answer a question as an incremental token stream.
    #[inline]
    pub async fn query_stream(&self, question: &str, top_k: Option<usize>) -> Result<TokenStream> {
        let prompt = self.prepare_prompt(question, top_k).await?;
        self.generation
            .generate_stream(&prompt, Some(&self.build_system_prompt()))
            .await
    }

    async fn prepare_prompt(&self, question: &str, top_k: Option<usize>) -> Result<String> {
        if !self.store.exists().await? {
            return Err(RagError::NotIndexed(self.folder.clone()));
        }

        let results = self.retrieve(question, top_k).await?;
        let context = build_context(&results);
        Ok(build_prompt(question, &context))
    }

    /// Embed the question and fetch the nearest chunks, closest first.
    #[inline]
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let query_vector = self.embedding.embed_one(question)?;
        let top_k = top_k.unwrap_or(self.config.top_k);
        self.store.search(&query_vector, top_k).await
    }

    fn build_system_prompt(&self) -> String {
        build_system_prompt(self.instructions.as_deref())
    }

    /// True once the folder has at least one indexed chunk.
    #[inline]
    pub async fn is_indexed(&self) -> Result<bool> {
        self.store.exists().await
    }

    /// Number of indexed chunks.
    #[inline]
    pub async fn chunk_count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// Drop every indexed chunk for this folder.
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Swap the generation provider without touching the index.
    #[inline]
    pub fn set_generation_provider(&mut self, generation: Box<dyn GenerationProvider>) {
        self.generation = generation;
    }

    #[inline]
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    #[inline]
    pub fn embedding_name(&self) -> String {
        self.embedding.name()
    }

    #[inline]
    pub fn generation_name(&self) -> String {
        self.generation.name()
    }

    #[inline]
    pub fn has_instructions(&self) -> bool {
        self.instructions.is_some()
    }
}

/// Render retrieved chunks as a numbered context block.
fn build_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No relevant documents found.".to_string();
    }

    let parts: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, result)| format!("[Document {} - {}]\n{}", i + 1, result.source, result.content))
        .collect();

    parts.join("\n\n---\n\n")
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "Based on the following context, please answer the question. \
         If the answer cannot be found in the context, say so clearly.\n\n\
         ## Context\n\n{context}\n\n## Question\n\n{question}\n\n## Answer"
    )
}

fn build_system_prompt(instructions: Option<&str>) -> String {
    const GUIDELINES: &str = "- Always base your answers on the provided context\n\
                              - If information is not in the context, clearly state that\n\
                              - Cite the source documents when relevant";

    match instructions {
        Some(instructions) => format!("{instructions}\n\nAdditional guidelines:\n{GUIDELINES}"),
        None => format!(
            "You are a helpful assistant that answers questions based on the \
             provided context documents.\n\n{GUIDELINES}"
        ),
    }
}
