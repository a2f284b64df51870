// CLI command handlers

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use dialoguer::{Confirm, Input};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::{Config, INDEX_DIR_NAME, INSTRUCTIONS_FILE_NAME};
use crate::engine::RagEngine;
use crate::llm::generation_provider;
use crate::store::VectorStore;
use crate::{RagError, Result};

/// Resolve and validate a folder argument before any work starts.
#[inline]
pub fn validate_folder(folder: &Path) -> Result<PathBuf> {
    if !folder.exists() {
        return Err(RagError::Config(format!(
            "Folder does not exist: {}",
            folder.display()
        )));
    }
    if !folder.is_dir() {
        return Err(RagError::Config(format!(
            "Not a directory: {}",
            folder.display()
        )));
    }
    Ok(folder.canonicalize()?)
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        println!("{} {}", style("Warning:").yellow().bold(), warning);
    }
}

/// Index every supported document in a folder.
#[inline]
pub async fn index_folder(
    folder: &Path,
    embedding: Option<&str>,
    rebuild: bool,
    config: &Config,
) -> Result<()> {
    let folder = validate_folder(folder)?;
    println!(
        "\n{} {}\n",
        style("Indexing folder:").blue().bold(),
        folder.display()
    );

    let embedding = embedding.unwrap_or(&config.default_embedding);
    let bar = spinner("Initializing...");
    let engine =
        RagEngine::with_provider_ids(&folder, config.clone(), &config.default_llm, embedding)
            .await?;
    bar.finish_and_clear();

    if engine.is_indexed().await? && !rebuild {
        let count = engine.chunk_count().await?;
        println!(
            "{}",
            style(format!("Index already exists with {count} chunks.")).yellow()
        );
        let proceed = Confirm::new()
            .with_prompt("Rebuild index?")
            .default(false)
            .interact()
            .map_err(anyhow::Error::from)?;
        if !proceed {
            return Ok(());
        }
    }

    let bar = spinner("Loading and indexing documents...");
    let report = engine.index(rebuild).await?;
    bar.finish_and_clear();

    print_warnings(&report.warnings);
    if report.chunks_indexed > 0 {
        println!(
            "\n{}",
            style(format!(
                "Successfully indexed {} document chunks.",
                report.chunks_indexed
            ))
            .green()
        );
    } else {
        println!("\n{}", style("No documents found to index.").yellow());
    }

    Ok(())
}

/// Ask a single question about an indexed folder.
#[inline]
pub async fn query_folder(
    folder: &Path,
    question: &str,
    llm: Option<&str>,
    embedding: Option<&str>,
    top_k: Option<usize>,
    config: &Config,
) -> Result<()> {
    let folder = validate_folder(folder)?;

    let llm = llm.unwrap_or(&config.default_llm);
    let embedding = embedding.unwrap_or(&config.default_embedding);

    let bar = spinner("Initializing...");
    let engine = RagEngine::with_provider_ids(&folder, config.clone(), llm, embedding).await?;
    bar.finish_and_clear();

    println!(
        "\n{} {}\n",
        style("Using:").bold(),
        engine.generation_name()
    );

    let bar = spinner("Thinking...");
    let answer = engine.query(question, top_k).await;
    bar.finish_and_clear();

    println!("{}", answer?);
    Ok(())
}

/// Interactive chat session over an indexed folder.
#[inline]
pub async fn chat_folder(
    folder: &Path,
    llm: Option<&str>,
    embedding: Option<&str>,
    config: &Config,
) -> Result<()> {
    let folder = validate_folder(folder)?;
    let llm = llm.unwrap_or(&config.default_llm).to_string();
    let embedding = embedding.unwrap_or(&config.default_embedding).to_string();

    let bar = spinner("Initializing...");
    let mut engine =
        RagEngine::with_provider_ids(&folder, config.clone(), &llm, &embedding).await?;
    bar.finish_and_clear();

    if !engine.is_indexed().await? {
        return Err(RagError::NotIndexed(folder));
    }

    if engine.has_instructions() {
        println!(
            "{}",
            style(format!(
                "Custom instructions loaded from {INSTRUCTIONS_FILE_NAME}"
            ))
            .dim()
        );
    }

    println!("{}", style("RAG Chat Session").bold());
    println!("Folder: {}", folder.display());
    println!("Documents: {} chunks", engine.chunk_count().await?);
    println!("LLM: {}", engine.generation_name());
    println!(
        "{}",
        style("Commands: 'quit' to exit, 'switch' to change LLM").dim()
    );

    loop {
        println!();
        let question: String = Input::new()
            .with_prompt(style("You").cyan().bold().to_string())
            .allow_empty(true)
            .interact_text()
            .map_err(anyhow::Error::from)?;
        let question = question.trim();

        if question.is_empty() {
            continue;
        }

        match question.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("\n{}", style("Goodbye!").dim());
                return Ok(());
            }
            "switch" => {
                switch_provider(&mut engine, config);
                continue;
            }
            _ => {}
        }

        print!("\n{} ", style("Assistant:").green().bold());
        match stream_answer(&engine, question).await {
            Ok(()) => println!(),
            Err(e) => println!("\n{} {e}", style("Error:").red().bold()),
        }
    }
}

/// Flip between the two generation providers without touching the index.
fn switch_provider(engine: &mut RagEngine, config: &Config) {
    let new_id = if engine.generation_name().to_lowercase().contains("anthropic") {
        "openai"
    } else {
        "anthropic"
    };

    match generation_provider(new_id, config) {
        Ok(provider) => {
            info!("Switching generation provider to {}", provider.name());
            println!(
                "{}",
                style(format!("Switched to {}", provider.name())).green()
            );
            engine.set_generation_provider(provider);
        }
        Err(e) => println!("{}", style(format!("Could not switch: {e}")).red()),
    }
}

async fn stream_answer(engine: &RagEngine, question: &str) -> Result<()> {
    let mut stream = engine.query_stream(question, None).await?;
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        print!("{}", fragment?);
        stdout.flush()?;
    }
    Ok(())
}

/// Show the index status for a folder.
#[inline]
pub async fn show_status(folder: &Path, config: &Config) -> Result<()> {
    let folder = validate_folder(folder)?;

    println!("\n{} {}", style("Folder:").bold(), folder.display());

    let index_path = folder.join(INDEX_DIR_NAME);
    if index_path.exists() {
        let store = VectorStore::open(&folder, config.default_embedding_dimension()).await?;
        let count = store.count().await?;
        if count > 0 {
            println!(
                "{}",
                style(format!("Index exists: {count} document chunks")).green()
            );
        } else {
            println!("{}", style("Index initialized but empty").yellow());
        }
    } else {
        println!("{}", style("Not indexed").yellow());
    }

    if folder.join(INSTRUCTIONS_FILE_NAME).exists() {
        println!("{}", style("Instructions file found").green());
    } else {
        println!("{}", style(format!("No {INSTRUCTIONS_FILE_NAME}")).dim());
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_folder_is_rejected() {
        let result = validate_folder(Path::new("/definitely/not/a/real/folder"));
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn file_path_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "content").expect("write");

        let result = validate_folder(&file);
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn existing_folder_resolves_to_absolute() {
        let dir = TempDir::new().expect("temp dir");
        let resolved = validate_folder(dir.path()).expect("should validate");
        assert!(resolved.is_absolute());
    }

    #[tokio::test]
    async fn status_does_not_create_an_index() {
        let dir = TempDir::new().expect("temp dir");
        show_status(dir.path(), &Config::default())
            .await
            .expect("status should succeed");
        assert!(!dir.path().join(INDEX_DIR_NAME).exists());
    }
}
