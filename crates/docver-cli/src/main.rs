//! docver: load the latest version of a document, or save new content as a
//! new version.
//!
//! Logs go to stderr; document content and version lines go to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use docver_core::config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};
use docver_core::{ApiClient, ClientConfig, ControllerEvent, DocumentController, SessionStore};

#[derive(Parser, Debug)]
#[command(name = "docver")]
#[command(about = "Load and save versions of a remote document")]
struct Args {
    /// Document service root
    #[arg(long, env = "DOCVER_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Bearer token for the session
    #[arg(long, env = "DOCVER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, env = "DOCVER_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the latest version of a document
    Show {
        document_id: String,
    },
    /// Save content as a new version (reads stdin without --text or --file)
    Save {
        document_id: String,

        /// Content to save
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,

        /// File whose content to save
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,docver_core=debug"
    } else {
        "info,docver_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::new(&args.base_url)?
        .with_token(args.token.clone())
        .with_timeout(Duration::from_secs(args.timeout.max(1)));
    debug!("Service: {}", config.base_url);

    let session = Arc::new(SessionStore::with_token(config.token.clone()));
    debug!("Session: {}", session_label(&session));
    let client = Arc::new(ApiClient::from_config(&config, session)?);

    match args.command {
        Command::Show { document_id } => show(client, document_id).await,
        Command::Save {
            document_id,
            text,
            file,
        } => {
            let content = read_content(text, file).await?;
            save(client, document_id, content).await
        }
    }
}

async fn show(client: Arc<ApiClient>, document_id: String) -> Result<()> {
    let controller = DocumentController::new(document_id, client);
    controller.set_view_mode(true);
    controller.open().await?;

    let snapshot = controller.snapshot();
    match &snapshot.latest {
        Some(latest) => println!("{}", latest),
        None => println!("No versions yet"),
    }
    print!("{}", snapshot.text);
    if !snapshot.text.ends_with('\n') && !snapshot.text.is_empty() {
        println!();
    }
    Ok(())
}

async fn save(client: Arc<ApiClient>, document_id: String, content: String) -> Result<()> {
    let controller = DocumentController::new(document_id, client);
    let _notices = controller.subscribe(|event| match event {
        ControllerEvent::VersionCreated { .. } => eprintln!("Saved! New version created."),
        ControllerEvent::SaveFailed { message, .. } => eprintln!("Save failed: {}", message),
        ControllerEvent::LoadFailed { message, .. } => {
            eprintln!("Failed to load document content: {}", message)
        }
        ControllerEvent::Loaded { .. }
        | ControllerEvent::Saved { .. }
        | ControllerEvent::ViewModeChanged { .. } => {}
    });

    controller.open().await?;
    if let Some(previous) = controller.latest() {
        info!("Replacing {}", previous);
    }

    controller.edit(content)?;
    match controller.save().await? {
        Some(latest) => println!("{}", latest),
        None => println!("Saved"),
    }
    Ok(())
}

fn session_label(session: &SessionStore) -> &'static str {
    if session.is_authenticated() {
        "bearer token"
    } else {
        "anonymous"
    }
}

async fn read_content(text: Option<String>, file: Option<PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    if let Some(path) = file {
        return tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    let mut content = String::new();
    tokio::io::stdin()
        .read_to_string(&mut content)
        .await
        .context("Failed to read content from stdin")?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_save_with_text() {
        let args = Args::try_parse_from([
            "docver",
            "--base-url",
            "http://example.test",
            "save",
            "doc1",
            "--text",
            "hello world",
        ])
        .unwrap();

        assert_eq!(args.base_url, "http://example.test");
        match args.command {
            Command::Save { document_id, text, file } => {
                assert_eq!(document_id, "doc1");
                assert_eq!(text.as_deref(), Some("hello world"));
                assert!(file.is_none());
            }
            other => panic!("expected save, got {:?}", other),
        }
    }

    #[test]
    fn test_text_and_file_conflict() {
        let result = Args::try_parse_from([
            "docver", "save", "doc1", "--text", "a", "--file", "b.txt",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_session_label_follows_token() {
        assert_eq!(session_label(&SessionStore::with_token(Some("abc".into()))), "bearer token");
        assert_eq!(session_label(&SessionStore::with_token(None)), "anonymous");
    }

    #[tokio::test]
    async fn test_read_content_prefers_text() {
        let content = read_content(Some("inline".into()), Some(PathBuf::from("/nonexistent")))
            .await
            .unwrap();
        assert_eq!(content, "inline");
    }
}
