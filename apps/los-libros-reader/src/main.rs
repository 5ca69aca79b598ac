//! Los Libros Reader
//!
//! Headless driver for the reading core. Imports an EPUB (or reopens a stored
//! book by id), pages through it on the in-memory engine and records the
//! reading position.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use los_libros_reader::engine::{MemoryEngineFactory, MountTarget};
use los_libros_reader::persistence::SqliteGateway;
use los_libros_reader::{Config, Library, ReadingSession, SessionContext, SessionNotice};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "los_libros_reader=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let mut args = std::env::args().skip(1);
    let target = args
        .next()
        .context("usage: los-libros-reader <book.epub | book-id> [pages]")?;
    let pages: usize = match args.next() {
        Some(n) => n.parse().context("page count must be a number")?,
        None => 10,
    };

    tracing::info!("Starting Los Libros Reader v{}", env!("CARGO_PKG_VERSION"));

    let gateway = SqliteGateway::connect(&config.database.url)
        .await
        .context("Failed to initialize database")?;

    let library = Library::new(gateway.clone(), gateway.clone());
    let book_id = if Path::new(&target).is_file() {
        let bytes = tokio::fs::read(&target)
            .await
            .with_context(|| format!("Failed to read {}", target))?;
        library.import(&bytes).await?.id
    } else {
        library.get(&target).await?.id
    };

    let settings = library.settings().await?;
    let context = SessionContext::new(
        library.gateway(),
        Arc::new(MemoryEngineFactory),
        config.reader.clone(),
    );
    let mount = MountTarget::new("reader", config.viewport.width, config.viewport.height);
    let mut session = ReadingSession::open(&book_id, mount, settings, &context).await?;

    for notice in session.process_pending() {
        tracing::debug!("{:?}", notice);
    }
    for _ in 0..pages {
        match session.next_page().await? {
            Some(SessionNotice::ProgressChanged {
                progress,
                page,
                total_pages,
                ..
            }) => tracing::info!("Page {} of {} ({}%)", page, total_pages, progress),
            Some(_) => {}
            None => {
                tracing::info!("Reached the end of the book");
                break;
            }
        }
        for notice in session.process_pending() {
            tracing::debug!("{:?}", notice);
        }
    }

    session.close().await;
    println!(
        "{}\t{}\t{}%\t{}",
        session.book().id,
        session.book().title,
        session.progress(),
        session.location().unwrap_or("-")
    );
    Ok(())
}
