//! # vload CLI
//!
//! Preload a batch of files into the local store, and read virtual files
//! through the same syscall surface a legacy application sees.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use vload_config::logging::{init_logging, LogLevel};
use vload_config::{log_cli_info, Config};
use vload_core::{FileSystem, Hooks, Options, Readiness};
use vload_shim::Shim;
use vload_store::{DiskStore, HttpSource};

/// Local-first file loader with network fallback
#[derive(Parser)]
#[command(name = "vload")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Local store root directory
    #[arg(long, global = true, env = "VLOAD_STORE_ROOT")]
    store_root: Option<PathBuf>,

    /// Base URL files are fetched from when missing locally
    #[arg(long, global = true, env = "VLOAD_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a batch of files and wait until all have resolved
    Preload {
        /// Virtual paths, fetched after the ones from --list
        #[arg(value_name = "PATH")]
        paths: Vec<String>,

        /// File with one virtual path per line
        #[arg(short, long, value_name = "FILE")]
        list: Option<PathBuf>,
    },

    /// Print a virtual file
    Cat {
        #[arg(value_name = "PATH")]
        path: String,

        /// Print a hex dump instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// Print the default configuration
    Config,
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    init_logging(LogLevel::Warn, Some("VLOAD_LOG"));

    let cli = Cli::parse();
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(root) = cli.store_root {
        config.store.root = root;
    }
    if let Some(url) = cli.base_url {
        config.network.base_url = url;
    }

    match cli.command {
        Commands::Preload { paths, list } => {
            if list.is_some() {
                config.preload.list = list;
            }
            if !paths.is_empty() {
                config.preload.paths = paths;
            }
            cmd_preload(&config)
        }
        Commands::Cat { path, hex } => cmd_cat(&config, &path, hex),
        Commands::Config => {
            print!("{}", Config::default_toml()?);
            Ok(())
        }
    }
}

/// Start a file system over the configured disk store and HTTP source.
fn start(config: &Config, preload: Vec<String>, hooks: Hooks) -> Result<FileSystem> {
    let root = config.store.resolved_root();
    let network = HttpSource::new(config.network.base_url.clone(), config.network.timeout())
        .context("failed to build HTTP client")?;
    log_cli_info!(
        "Starting",
        store = tracing::field::display(root.display()),
        base_url = config.network.base_url.as_str(),
        files = preload.len()
    );

    let options = Options {
        preload,
        ..Options::from(config)
    };
    Ok(FileSystem::start(options, DiskStore::new(root), network, hooks)?)
}

fn cmd_preload(config: &Config) -> Result<()> {
    let batch = config.preload.resolve()?;
    if batch.is_empty() {
        bail!("nothing to preload: pass paths, --list, or set [preload] in config");
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {bytes} {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(format!("loading {} files", batch.len()));

    let progress = pb.clone();
    let done = pb.clone();
    let hooks = Hooks::new()
        .on_progress(move |n| progress.inc(n))
        .on_ready(move || done.set_message("ready"));

    let fs = start(config, batch.clone(), hooks)?;
    fs.wait_ready();
    pb.finish_and_clear();

    let mut failed = 0;
    for path in &batch {
        let Some(entry) = fs.entry(path) else {
            continue;
        };
        match entry.readiness() {
            Readiness::Ready => {
                let len = entry.wait().data().len();
                println!("ok      {:>10}  {}", len, path);
            }
            other => {
                failed += 1;
                let label = format!("{:?}", other).to_lowercase();
                println!("{:<7} {:>10}  {}", label, "-", path);
            }
        }
    }

    // Downloads are persisted before the store is released.
    fs.shutdown();
    println!("{} of {} files ready", batch.len() - failed, batch.len());
    if failed > 0 {
        bail!("{} files could not be loaded", failed);
    }
    Ok(())
}

fn cmd_cat(config: &Config, path: &str, hex: bool) -> Result<()> {
    let fs = Arc::new(start(config, vec![path.to_string()], Hooks::new())?);
    fs.wait_ready();

    if hex {
        print!("{}", fs.dump(path)?);
        fs.shutdown();
        return Ok(());
    }

    let shim = Shim::new(Arc::clone(&fs));
    let fd = shim.open(path, libc::O_RDONLY);
    if fd < 0 {
        let err = std::io::Error::last_os_error();
        fs.shutdown();
        return Err(err).with_context(|| format!("cannot open {}", path));
    }

    let mut buf = [0u8; 4096];
    loop {
        let n = shim.read(fd, &mut buf);
        if n < 0 {
            return Err(std::io::Error::last_os_error()).context("read failed");
        }
        if n == 0 {
            break;
        }
        // Descriptor 1 passes straight through to the real stdout.
        let mut rest = &buf[..n as usize];
        while !rest.is_empty() {
            let written = shim.write(1, rest);
            if written < 0 {
                return Err(std::io::Error::last_os_error()).context("write failed");
            }
            rest = &rest[written as usize..];
        }
    }
    shim.close(fd);
    fs.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preload_with_list() {
        let cli = Cli::try_parse_from([
            "vload",
            "--store-root",
            "/tmp/store",
            "preload",
            "--list",
            "files.txt",
            "id1/pak0.pak",
        ])
        .unwrap();
        assert_eq!(cli.store_root, Some(PathBuf::from("/tmp/store")));
        match cli.command {
            Commands::Preload { paths, list } => {
                assert_eq!(paths, vec!["id1/pak0.pak"]);
                assert_eq!(list, Some(PathBuf::from("files.txt")));
            }
            _ => panic!("expected preload"),
        }
    }

    #[test]
    fn test_parse_cat_hex_with_trailing_global() {
        let cli = Cli::try_parse_from([
            "vload",
            "cat",
            "id1/config.cfg",
            "--hex",
            "--base-url",
            "http://mirror.example",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://mirror.example"));
        assert!(matches!(cli.command, Commands::Cat { hex: true, .. }));
    }

    #[test]
    fn test_cat_requires_path() {
        assert!(Cli::try_parse_from(["vload", "cat"]).is_err());
    }
}
