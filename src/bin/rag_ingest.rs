use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use pif_rag::config::{collection_name, Settings};
use pif_rag::indexer::chunker::chunk_document;
use pif_rag::indexer::extractor::{clean_extracted_text, extract_pdf};
use pif_rag::rag::embedding::EmbeddingClient;
use pif_rag::rag::vector_store::VectorStore;

const QDRANT_CONNECT_RETRIES: u32 = 5;

#[derive(Parser, Debug)]
#[command(name = "rag-ingest")]
#[command(about = "Extract, chunk, embed and upload annual reports to the vector index")]
struct Args {
    /// Directory containing the report PDFs
    #[arg(short, long, default_value = ".")]
    reports_dir: PathBuf,

    /// Maximum chunk size in bytes
    #[arg(long, default_value_t = 1000)]
    chunk_size: usize,

    /// Overlap between consecutive chunks in bytes
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Points uploaded per batch
    #[arg(long, default_value_t = 64)]
    upload_batch_size: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    if !args.reports_dir.exists() {
        anyhow::bail!("Reports directory does not exist: {}", args.reports_dir.display());
    }

    println!("Connecting to embedding service at {}...", settings.ollama_url);
    let embeddings = EmbeddingClient::connect(
        &settings.ollama_url,
        &settings.embed_model,
        settings.embed_dimension,
        settings.embed_batch_size,
    )
    .await?;

    println!("Connecting to Qdrant at {}...", settings.qdrant_url);
    let vector_store = VectorStore::connect(&settings.qdrant_url, QDRANT_CONNECT_RETRIES).await?;

    // One job per (language, year) report named in the configuration.
    let mut jobs: Vec<(String, String, PathBuf)> = Vec::new();
    for map in [&settings.reports_ar, &settings.reports_en] {
        for (year, stem) in map {
            let path = args.reports_dir.join(format!("{}.pdf", stem));
            if !path.exists() {
                tracing::warn!("File not found: {}", path.display());
                continue;
            }
            jobs.push((year.clone(), stem.clone(), path));
        }
    }

    if jobs.is_empty() {
        println!("No report PDFs found in {}. Exiting.", args.reports_dir.display());
        return Ok(());
    }

    println!("Processing {} reports", jobs.len());
    let pb = ProgressBar::new(jobs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut success_count = 0usize;
    let mut fail_count = 0usize;
    let mut total_chunks = 0usize;
    let mut failed_reports: Vec<(String, String)> = Vec::new();

    for (year, stem, path) in &jobs {
        pb.set_message(format!("{} ({})", stem, year));

        match process_report(path, stem, &embeddings, &vector_store, &settings, &args).await {
            Ok(chunk_count) => {
                success_count += 1;
                total_chunks += chunk_count;
            }
            Err(e) => {
                tracing::error!("Failed to process {}: {}", path.display(), e);
                failed_reports.push((stem.clone(), format!("{}", e)));
                fail_count += 1;
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("done");

    println!("\nIngestion complete!");
    println!("  Reports processed: {}/{}", success_count, jobs.len());
    println!("  Reports failed:    {}", fail_count);
    println!("  Total chunks:      {}", total_chunks);
    println!("  Qdrant URL:        {}", settings.qdrant_url);

    if !failed_reports.is_empty() {
        println!("\nFailed reports:");
        for (stem, err) in &failed_reports {
            println!("  {}: {}", stem, err);
        }
    }

    Ok(())
}

async fn process_report(
    path: &Path,
    stem: &str,
    embeddings: &EmbeddingClient,
    vector_store: &VectorStore,
    settings: &Settings,
    args: &Args,
) -> Result<usize> {
    let raw_text = extract_pdf(path)?;
    let text = clean_extracted_text(&raw_text);

    let chunks = chunk_document(stem, &text, args.chunk_size, args.chunk_overlap);
    if chunks.is_empty() {
        tracing::warn!("No valid chunks found for {}", path.display());
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embeddings.embed(&texts).await;

    let collection = collection_name(stem);
    vector_store
        .recreate_collection(&collection, settings.embed_dimension)
        .await?;
    vector_store
        .upload(
            &collection,
            &vectors,
            &chunks,
            settings.embed_dimension,
            args.upload_batch_size,
        )
        .await?;

    tracing::info!("Verifying data storage for {}...", collection);
    if vector_store.verify(&collection).await? {
        tracing::info!(
            "Successfully processed and verified {} chunks for {}",
            chunks.len(),
            path.display()
        );
    } else {
        tracing::warn!("Data verification issues for {}", path.display());
    }

    Ok(chunks.len())
}
