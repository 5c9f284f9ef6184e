#![deny(unsafe_code)]

//! `mksqfs` - create a SquashFS image from a directory tree and/or a
//! pseudo-file description.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::{env, io};

use fstree::SortOrder;
use image::{BuildConfig, Builder};
use walk::ScanOptions;

const USAGE: &str = "\
usage: mksqfs [SOURCE] DEST [options]

options:
  -p, --pseudo FILE     add entries from a pseudo-file description
  -b, --block-size N    block size, power of two 4K..1M (default 128K)
      --comp CODEC      gzip | lz4 | zstd (default gzip)
      --level N         compression level (codec default otherwise)
  -j, --workers N       compression threads (0 = inline)
      --no-fragments    do not pack file tails into fragments
      --no-dedup        skip duplicate-block elimination
      --no-pad          skip end-of-archive padding
      --no-xattrs       do not store extended attributes
      --exportable      write the NFS export table
      --force-uid N     set every owner id
      --force-gid N     set every group id
      --mtime N         superblock timestamp (default 0)
      --sort FILE       packing priorities, '<path> <priority>' lines
      --transparent     decode gzip/zstd input files on the fly
      --one-file-system stay on the source filesystem
  -q, --quiet           errors only
  -h, --help            this text
";

fn main() -> ExitCode {
    let mut stderr = io::stderr().lock();
    run_with(env::args().skip(1).collect(), &mut stderr)
}

fn run_with<E: Write>(args: Vec<String>, stderr: &mut E) -> ExitCode {
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Usage(message)) => {
            let _ = writeln!(stderr, "mksqfs: {message}");
            let _ = write!(stderr, "{USAGE}");
            ExitCode::FAILURE
        }
        Err(Failure::Build(error)) => {
            let _ = writeln!(stderr, "mksqfs: {error}");
            ExitCode::FAILURE
        }
    }
}

enum Failure {
    Usage(String),
    Build(image::ImageError),
}

impl From<image::ImageError> for Failure {
    fn from(error: image::ImageError) -> Self {
        Self::Build(error)
    }
}

struct Options {
    source: Option<PathBuf>,
    dest: PathBuf,
    pseudo: Vec<PathBuf>,
    one_file_system: bool,
    quiet: bool,
    cfg: BuildConfig,
}

fn run(args: Vec<String>) -> Result<(), Failure> {
    let options = parse_args(args)?;

    if !options.quiet {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(io::stderr)
            .init();
    }

    let mut builder = Builder::new(options.cfg)?;
    if let Some(source) = &options.source {
        let scan = ScanOptions {
            one_file_system: options.one_file_system,
            ..ScanOptions::default()
        };
        builder.add_source_dir(source, scan)?;
    }
    for path in &options.pseudo {
        let file = File::open(path).map_err(|source| image::ImageError::InputIo {
            path: path.clone(),
            source,
        })?;
        let ops = pseudo::parse(BufReader::new(file), &path.display().to_string())
            .map_err(image::ImageError::Pseudo)?;
        builder.add_pseudo_ops(&ops)?;
    }

    builder.build(&options.dest)?;
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<Options, Failure> {
    let usage = |message: String| Failure::Usage(message);

    let mut cfg = BuildConfig::new();
    let mut positional: Vec<String> = Vec::new();
    let mut pseudo = Vec::new();
    let mut one_file_system = false;
    let mut quiet = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        let mut value_for = |flag: &str| {
            iter.next().ok_or_else(|| usage(format!("{flag} needs a value")))
        };
        match arg.as_str() {
            "-h" | "--help" => return Err(usage("help requested".into())),
            "-p" | "--pseudo" => pseudo.push(PathBuf::from(value_for("--pseudo")?)),
            "-b" | "--block-size" => {
                cfg.block_size = parse_size(&value_for("--block-size")?)
                    .ok_or_else(|| usage("invalid block size".into()))?;
            }
            "--comp" => {
                cfg.codec = value_for("--comp")?
                    .parse()
                    .map_err(|e| usage(format!("{e}")))?;
            }
            "--level" => {
                cfg.level = Some(
                    value_for("--level")?
                        .parse()
                        .map_err(|_| usage("invalid level".into()))?,
                );
            }
            "-j" | "--workers" => {
                cfg.workers = value_for("--workers")?
                    .parse()
                    .map_err(|_| usage("invalid worker count".into()))?;
            }
            "--no-fragments" => cfg.fragments = false,
            "--no-dedup" => cfg.dedup = false,
            "--no-pad" => cfg.pad_to_4k = false,
            "--no-xattrs" => cfg.scan_xattrs = false,
            "--exportable" => cfg.exportable = true,
            "--force-uid" => {
                cfg.force_uid = Some(
                    value_for("--force-uid")?
                        .parse()
                        .map_err(|_| usage("invalid uid".into()))?,
                );
            }
            "--force-gid" => {
                cfg.force_gid = Some(
                    value_for("--force-gid")?
                        .parse()
                        .map_err(|_| usage("invalid gid".into()))?,
                );
            }
            "--mtime" => {
                cfg.mtime = value_for("--mtime")?
                    .parse()
                    .map_err(|_| usage("invalid mtime".into()))?;
            }
            "--sort" => {
                let path = PathBuf::from(value_for("--sort")?);
                let file = File::open(&path).map_err(|source| {
                    Failure::Build(image::ImageError::InputIo { path, source })
                })?;
                cfg.sort = Some(
                    SortOrder::parse(BufReader::new(file))
                        .map_err(|e| usage(format!("{e}")))?,
                );
            }
            "--transparent" => cfg.transparent_input = true,
            "--one-file-system" => one_file_system = true,
            "-q" | "--quiet" => quiet = true,
            flag if flag.starts_with('-') => {
                return Err(usage(format!("unknown option {flag}")));
            }
            _ => positional.push(arg),
        }
    }

    let (source, dest) = match positional.as_slice() {
        [dest] if !pseudo.is_empty() => (None, PathBuf::from(dest)),
        [source, dest] => (Some(PathBuf::from(source)), PathBuf::from(dest)),
        _ => return Err(usage("expected SOURCE DEST, or DEST with --pseudo".into())),
    };

    Ok(Options { source, dest, pseudo, one_file_system, quiet, cfg })
}

/// Parses `131072`, `128K`, or `1M`.
fn parse_size(text: &str) -> Option<u32> {
    let text = text.trim();
    let (digits, multiplier) = match text.as_bytes().last()? {
        b'k' | b'K' => (&text[..text.len() - 1], 1024),
        b'm' | b'M' => (&text[..text.len() - 1], 1024 * 1024),
        _ => (text, 1),
    };
    digits.parse::<u32>().ok()?.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parse_size_accepts_suffixes() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("128K"), Some(131_072));
        assert_eq!(parse_size("1m"), Some(1_048_576));
        assert_eq!(parse_size("x"), None);
    }

    #[test]
    fn missing_arguments_print_usage() {
        let mut stderr = Vec::new();
        let exit = run_with(vec![], &mut stderr);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(String::from_utf8_lossy(&stderr).contains("usage:"));
    }

    #[test]
    fn pseudo_only_build_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let pseudo_path = dir.path().join("fs.txt");
        fs::write(&pseudo_path, "dir /a 0755 0 0\n").unwrap();
        let dest = dir.path().join("out.img");

        let mut stderr = Vec::new();
        let exit = run_with(
            vec![
                "--quiet".into(),
                "--pseudo".into(),
                pseudo_path.display().to_string(),
                dest.display().to_string(),
            ],
            &mut stderr,
        );
        assert_eq!(exit, ExitCode::SUCCESS, "{}", String::from_utf8_lossy(&stderr));
        assert!(dest.exists());
    }

    #[test]
    fn directory_build_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("f"), b"contents").unwrap();
        let dest = dir.path().join("out.img");

        let mut stderr = Vec::new();
        let exit = run_with(
            vec![
                "-q".into(),
                source.display().to_string(),
                dest.display().to_string(),
                "-b".into(),
                "4K".into(),
            ],
            &mut stderr,
        );
        assert_eq!(exit, ExitCode::SUCCESS, "{}", String::from_utf8_lossy(&stderr));
        assert!(dest.exists());
    }

    #[test]
    fn bad_codec_is_a_usage_error() {
        let mut stderr = Vec::new();
        let exit = run_with(vec!["--comp".into(), "brotli".into()], &mut stderr);
        assert_eq!(exit, ExitCode::FAILURE);
        assert!(String::from_utf8_lossy(&stderr).contains("brotli"));
    }
}
