//! MirrorStore CLI -- manage a remote blob container through the store.
//!
//! Every subcommand builds the configured client and store first, so a
//! bad configuration fails before any blob is touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use walkdir::WalkDir;

use mirrorstore::naming::clean_name;
use mirrorstore::{BlobClient, Config, CorsRule, FileStore, Payload};

/// Command-line arguments for the MirrorStore tool.
#[derive(Parser)]
#[command(
    name = "mirrorstore",
    version,
    about = "Remote blob storage with gzip upload transformation and a local mirror"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "mirrorstore.example.yaml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local directory tree to the store
    Upload {
        /// Local directory to upload from.
        #[arg(long)]
        source: PathBuf,
        /// Key prefix to upload under.
        #[arg(long, default_value = "")]
        dest: String,
        /// Ignore pattern (`*` and `?` wildcards); repeatable.
        #[arg(long)]
        ignore: Vec<String>,
        /// Skip the built-in `.*` and `*~` ignore patterns.
        #[arg(long, default_value_t = false)]
        no_default_ignore: bool,
    },
    /// Set or clear the blob service CORS rule
    SetCors {
        /// Allowed origin; repeatable.
        #[arg(long)]
        origins: Vec<String>,
        /// Allowed HTTP method; repeatable.
        #[arg(long)]
        methods: Vec<String>,
        /// Preflight cache lifetime in seconds.
        #[arg(long, default_value_t = 3600)]
        max_age: u32,
        /// Remove every CORS rule instead of setting one.
        #[arg(long, default_value_t = false)]
        disable: bool,
    },
    /// Recursively delete everything under a prefix
    Clear {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// List stored keys
    Ls {
        #[arg(default_value = "")]
        prefix: String,
        /// Print every key under the prefix instead of one level.
        #[arg(long, default_value_t = false)]
        flat: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mirrorstore::load_config(&cli.config)?;
    init_tracing(&config);
    info!("Loaded configuration from {}", cli.config);

    let client = mirrorstore::client::from_config(&config)?;
    let store = mirrorstore::store::from_config(&config, Arc::clone(&client))?;

    match cli.command {
        Commands::Upload {
            source,
            dest,
            ignore,
            no_default_ignore,
        } => run_upload(store.as_ref(), &source, &dest, ignore, no_default_ignore).await,
        Commands::SetCors {
            origins,
            methods,
            max_age,
            disable,
        } => run_set_cors(client.as_ref(), origins, methods, max_age, disable).await,
        Commands::Clear { prefix } => run_clear(store.as_ref(), &prefix).await,
        Commands::Ls { prefix, flat } => run_ls(store.as_ref(), &prefix, flat).await,
    }
}

/// Initialize tracing from the logging config; `RUST_LOG` overrides
/// the configured level.
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_upload(
    store: &dyn FileStore,
    source: &Path,
    dest: &str,
    ignore: Vec<String>,
    no_default_ignore: bool,
) -> anyhow::Result<()> {
    let mut patterns: Vec<String> = Vec::new();
    if !no_default_ignore {
        patterns.push(".*".to_string());
        patterns.push("*~".to_string());
    }
    patterns.extend(ignore);

    let walker = WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        // Never test the root itself against the ignore patterns, or a
        // source of "." would prune the whole walk.
        .filter_entry(|entry| entry.depth() == 0 || !matches_any(&patterns, entry.file_name()));

    let mut uploaded = 0usize;
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("entry escapes source dir: {}", entry.path().display()))?;
        let key = store_key(dest, relative);

        let data = tokio::fs::read(entry.path())
            .await
            .with_context(|| format!("failed to read {}", entry.path().display()))?;
        let saved = store
            .save(&key, Payload::new(data))
            .await
            .with_context(|| format!("failed to upload {}", key))?;
        println!("uploaded {}", saved);
        uploaded += 1;
    }

    println!("Uploaded {} files", uploaded);
    Ok(())
}

async fn run_set_cors(
    client: &dyn BlobClient,
    origins: Vec<String>,
    methods: Vec<String>,
    max_age: u32,
    disable: bool,
) -> anyhow::Result<()> {
    if disable {
        client.set_cors(&[]).await?;
        println!("CORS rules cleared");
        return Ok(());
    }

    if origins.is_empty() {
        anyhow::bail!("--origins is required unless --disable is given");
    }
    if methods.is_empty() {
        anyhow::bail!("--methods is required unless --disable is given");
    }

    let rule = CorsRule {
        allowed_origins: origins,
        allowed_methods: methods,
        max_age_seconds: max_age,
    };
    client.set_cors(&[rule]).await?;
    println!("CORS rule set");
    Ok(())
}

async fn run_clear(store: &dyn FileStore, prefix: &str) -> anyhow::Result<()> {
    let base = clean_name(prefix).trim_end_matches('/').to_string();
    let listing = store.listdir_flat(&base).await?;

    let mut deleted = 0usize;
    for relative in &listing.files {
        let key = if base.is_empty() {
            relative.clone()
        } else {
            format!("{}/{}", base, relative)
        };
        store
            .delete(&key)
            .await
            .with_context(|| format!("failed to delete {}", key))?;
        deleted += 1;
    }

    println!("Deleted {} blobs", deleted);
    Ok(())
}

async fn run_ls(store: &dyn FileStore, prefix: &str, flat: bool) -> anyhow::Result<()> {
    let listing = if flat {
        store.listdir_flat(prefix).await?
    } else {
        store.listdir(prefix).await?
    };

    for dir in &listing.dirs {
        println!("{}/", dir);
    }
    for file in &listing.files {
        println!("{}", file);
    }
    Ok(())
}

/// Join the destination prefix and a walked relative path into a
/// storage key.
fn store_key(dest: &str, relative: &Path) -> String {
    let name = clean_name(&relative.to_string_lossy());
    let prefix = dest.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// True when any ignore pattern matches the file name.
fn matches_any(patterns: &[String], name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    patterns.iter().any(|pattern| wildcard_match(pattern, &name))
}

/// Shell-style wildcard match: `*` spans any run of characters, `?`
/// matches exactly one.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    // Two-pointer scan, backtracking to the most recent `*` on mismatch.
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_literal() {
        assert!(wildcard_match("readme.txt", "readme.txt"));
        assert!(!wildcard_match("readme.txt", "readme.md"));
    }

    #[test]
    fn test_wildcard_star() {
        assert!(wildcard_match("*~", "notes.txt~"));
        assert!(wildcard_match(".*", ".gitignore"));
        assert!(wildcard_match("*.css", "site.css"));
        assert!(!wildcard_match("*.css", "site.css.map"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("a*c", "abc"));
        assert!(wildcard_match("a*c", "ac"));
    }

    #[test]
    fn test_wildcard_question_mark() {
        assert!(wildcard_match("v?.txt", "v1.txt"));
        assert!(!wildcard_match("v?.txt", "v10.txt"));
    }

    #[test]
    fn test_wildcard_does_not_ignore_plain_names() {
        assert!(!wildcard_match(".*", "visible.txt"));
        assert!(!wildcard_match("*~", "visible.txt"));
    }

    #[test]
    fn test_store_key_joins_prefix() {
        assert_eq!(
            store_key("media", Path::new("css/site.css")),
            "media/css/site.css"
        );
        assert_eq!(store_key("media/", Path::new("a.txt")), "media/a.txt");
        assert_eq!(store_key("", Path::new("a.txt")), "a.txt");
    }
}
