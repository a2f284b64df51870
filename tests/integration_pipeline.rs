//! End-to-end pipeline tests with deterministic in-process providers.
//!
//! Real embedding and generation backends are replaced by a hashed
//! bag-of-words embedder and an echo generator, so the whole
//! load → chunk → embed → store → retrieve → prompt path runs hermetically.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tempfile::TempDir;

use ragbox::config::Config;
use ragbox::embeddings::EmbeddingProvider;
use ragbox::engine::RagEngine;
use ragbox::llm::{GenerationProvider, TokenStream};
use ragbox::{RagError, Result};

const DIMENSION: usize = 16;

/// Hashed bag-of-words embedding: each word lands in one of 16 buckets, so
/// texts sharing vocabulary land close under cosine distance.
struct BagOfWordsEmbedding;

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        vector[(hasher.finish() as usize) % DIMENSION] += 1.0;
    }
    vector
}

impl EmbeddingProvider for BagOfWordsEmbedding {
    fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        Ok(bag_of_words(text))
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn name(&self) -> String {
        "bag-of-words".to_string()
    }
}

/// Echoes the assembled prompt back so tests can inspect it.
struct EchoGeneration;

#[async_trait]
impl GenerationProvider for EchoGeneration {
    async fn generate(&self, prompt: &str, _system: Option<&str>) -> Result<String> {
        Ok(prompt.to_string())
    }

    async fn generate_stream(&self, prompt: &str, _system: Option<&str>) -> Result<TokenStream> {
        let fragments: Vec<Result<String>> = prompt
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(fragments)))
    }

    fn name(&self) -> String {
        "echo".to_string()
    }
}

async fn engine_for(folder: &Path) -> RagEngine {
    RagEngine::with_providers(
        folder,
        Config::default(),
        Box::new(BagOfWordsEmbedding),
        Box::new(EchoGeneration),
    )
    .await
    .expect("engine should build")
}

/// A 2500-character document whose opening is about zebras and whose tail is
/// about submarines, with neutral filler in between. With a 1000-character
/// window and 200-character overlap it chunks into 4 windows.
fn long_document() -> String {
    let opening = "The zebra grazes on the golden savanna at dawn, flicking its striped tail. ";
    let closing = "Deep below, the submarine hums through the midnight trench on silent engines. ";
    let filler = "Plain filler sentences carry no special vocabulary at all. ";

    let mut text = String::from(opening);
    while text.len() < 2500 - closing.len() {
        text.push_str(filler);
    }
    text.truncate(2500 - closing.len());
    text.push_str(closing);
    assert_eq!(text.len(), 2500);
    text
}

#[tokio::test]
async fn a_2500_character_file_indexes_into_four_chunks() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("long.txt"), long_document()).expect("write");

    let engine = engine_for(dir.path()).await;
    let report = engine.index(false).await.expect("index");

    assert_eq!(report.chunks_indexed, 4);
    assert_eq!(engine.chunk_count().await.expect("count"), 4);
}

#[tokio::test]
async fn retrieval_surfaces_the_chunk_matching_the_question() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("long.txt"), long_document()).expect("write");

    let engine = engine_for(dir.path()).await;
    engine.index(false).await.expect("index");

    // The zebra sentence lives only in the first window.
    let results = engine
        .retrieve("where does the zebra graze at dawn?", None)
        .await
        .expect("retrieve");
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].source, "long.txt");
    assert_eq!(results[0].chunk_index, 0);

    // The submarine sentence lives only in the last window.
    let results = engine
        .retrieve("what hums through the midnight trench?", None)
        .await
        .expect("retrieve");
    assert_eq!(results[0].chunk_index, 3);
}

#[tokio::test]
async fn per_query_top_k_overrides_the_configured_default() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("long.txt"), long_document()).expect("write");

    let engine = engine_for(dir.path()).await;
    engine.index(false).await.expect("index");

    let results = engine
        .retrieve("where does the zebra graze at dawn?", Some(2))
        .await
        .expect("retrieve");
    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn the_assembled_prompt_numbers_documents_and_keeps_the_question() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("long.txt"), long_document()).expect("write");

    let engine = engine_for(dir.path()).await;
    engine.index(false).await.expect("index");

    let prompt = engine
        .query("where does the zebra graze?", None)
        .await
        .expect("query");

    assert!(prompt.starts_with("Based on the following context"));
    assert!(prompt.contains("[Document 1 - long.txt]"));
    assert!(prompt.contains("The zebra grazes on the golden savanna"));
    assert!(prompt.contains("## Question\n\nwhere does the zebra graze?"));
    assert!(prompt.ends_with("## Answer"));
}

#[tokio::test]
async fn streaming_reassembles_to_the_full_answer() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("long.txt"), long_document()).expect("write");

    let engine = engine_for(dir.path()).await;
    engine.index(false).await.expect("index");

    let full = engine.query("where does the zebra graze?", None).await.expect("query");
    let stream = engine
        .query_stream("where does the zebra graze?", None)
        .await
        .expect("stream");
    let streamed: String = stream.map(|f| f.expect("fragment")).collect().await;

    assert_eq!(streamed, full);
}

#[tokio::test]
async fn the_index_persists_across_engine_instances() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("long.txt"), long_document()).expect("write");

    {
        let engine = engine_for(dir.path()).await;
        engine.index(false).await.expect("index");
    }

    let engine = engine_for(dir.path()).await;
    assert!(engine.is_indexed().await.expect("is_indexed"));
    assert_eq!(engine.chunk_count().await.expect("count"), 4);

    let results = engine
        .retrieve("where does the zebra graze at dawn?", None)
        .await
        .expect("retrieve");
    assert_eq!(results[0].chunk_index, 0);
}

#[tokio::test]
async fn querying_before_indexing_names_the_folder() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("long.txt"), long_document()).expect("write");

    let engine = engine_for(dir.path()).await;
    let err = engine
        .query("anything", None)
        .await
        .err()
        .expect("query must fail before indexing");

    match err {
        RagError::NotIndexed(folder) => assert_eq!(folder, dir.path()),
        other => panic!("expected NotIndexed, got {other}"),
    }
}

#[tokio::test]
async fn mixed_folder_indexes_every_supported_file() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("notes.md"), "# Zebra notes\nStripes everywhere.").expect("write");
    fs::write(dir.path().join("code.rs"), "fn main() { println!(\"zebra\"); }").expect("write");
    fs::write(dir.path().join("image.png"), [0x89, 0x50, 0x4e, 0x47]).expect("write");
    fs::create_dir(dir.path().join("nested")).expect("mkdir");
    fs::write(dir.path().join("nested/deep.txt"), "submarines in the trench").expect("write");

    let engine = engine_for(dir.path()).await;
    let report = engine.index(false).await.expect("index");

    // The PNG is skipped silently; the three text-like files index.
    assert_eq!(report.chunks_indexed, 3);

    let results = engine.retrieve("submarines", None).await.expect("retrieve");
    assert_eq!(results[0].source, "nested/deep.txt");
}
