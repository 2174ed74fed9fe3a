//! Command-line front end for zipkit.
//!
//! `zipkit -c out.zip FILES...` writes a new archive; otherwise the archive
//! is listed (`-l`, `-v`) or extracted.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use zipkit::{
    Cli, CompressionMethod, LocalFileReader, LogObserver, ReadOptions, WriterOptions,
    ZipExtractor, ZipFileEntry, ZipWriter,
};

type Extractor = ZipExtractor<LocalFileReader, LogObserver>;

/// Parses arguments and dispatches to create, list or extract mode.
/// Diagnostics go through `log`; `RUST_LOG=debug` shows every parsed header.
fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.create {
        return create_zip(&cli);
    }

    let reader = LocalFileReader::new(Path::new(&cli.file))
        .with_context(|| format!("cannot open {}", cli.file))?;
    let options = ReadOptions {
        verify_crc: cli.verify_crc,
        skip_macos_metadata: !cli.keep_macos,
    };
    let mut extractor = ZipExtractor::with_options(reader, options, LogObserver)
        .with_context(|| format!("cannot read {}", cli.file))?;

    if cli.list || cli.verbose {
        print_listing(&extractor, cli.verbose);
        return Ok(());
    }
    extract_selected(&mut extractor, &cli)
}

/// Build a new archive from the files named on the command line.
///
/// Directories are not walked.
fn create_zip(cli: &Cli) -> Result<()> {
    if cli.files.is_empty() {
        bail!("nothing to add: -c needs at least one file");
    }

    let options = WriterOptions {
        method: if cli.deflate {
            CompressionMethod::Deflate
        } else {
            CompressionMethod::Stored
        },
        comment: cli.comment.clone().unwrap_or_default().into_bytes(),
        ..Default::default()
    };

    let out = File::create(&cli.file).with_context(|| format!("cannot create {}", cli.file))?;
    let mut writer = ZipWriter::with_options(BufWriter::new(out), options);

    for path in &cli.files {
        let data = std::fs::read(path).with_context(|| format!("cannot read {path}"))?;
        let name = entry_name(path);
        writer
            .add_entry(&name, &data)
            .with_context(|| format!("cannot add {path}"))?;
        if !cli.is_quiet() {
            println!("  adding: {name} ({})", human_size(data.len() as u64));
        }
    }

    let count = writer.len();
    writer.close().with_context(|| format!("cannot finish {}", cli.file))?;

    if !cli.is_quiet() {
        println!("Created {} with {count} entries", cli.file);
    }
    Ok(())
}

/// Name an entry after the path it was added from, using `/` separators and
/// no leading root or `./`.
fn entry_name(path: &str) -> String {
    let name = path.replace('\\', "/");
    let mut name = name.as_str();
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    name.to_string()
}

/// Which entries an extraction run touches.
struct Selection<'a> {
    include: &'a [String],
    exclude: &'a [String],
    keep_macos: bool,
}

impl<'a> Selection<'a> {
    fn from_cli(cli: &'a Cli) -> Self {
        Self {
            include: &cli.files,
            exclude: &cli.exclude,
            keep_macos: cli.keep_macos,
        }
    }

    fn wants(&self, entry: &ZipFileEntry) -> bool {
        // Directories come into being with the files inside them.
        if entry.is_directory || (!self.keep_macos && entry.is_macos_metadata()) {
            return false;
        }
        let name = entry.file_name.as_str();
        if !self.include.is_empty() && !self.include.iter().any(|p| names_match(p, name)) {
            return false;
        }
        !self
            .exclude
            .iter()
            .any(|p| name.contains(p.as_str()) || wildcard_match(p, name))
    }
}

/// A pattern without wildcards names either the full entry path or its
/// final component.
fn names_match(pattern: &str, name: &str) -> bool {
    if pattern.contains(['*', '?']) {
        return wildcard_match(pattern, name);
    }
    name == pattern || name.rsplit('/').next() == Some(pattern)
}

/// What to do when the output path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overwrite {
    Never,
    Always,
    Ask,
}

impl Overwrite {
    fn from_cli(cli: &Cli) -> Self {
        if cli.never_overwrite {
            Overwrite::Never
        } else if cli.overwrite {
            Overwrite::Always
        } else {
            Overwrite::Ask
        }
    }
}

/// Extract every selected entry. A failing entry is reported and the rest
/// still run; the command fails at the end if any entry did.
fn extract_selected(extractor: &mut Extractor, cli: &Cli) -> Result<()> {
    let selection = Selection::from_cli(cli);
    let chosen: Vec<ZipFileEntry> = extractor
        .list_files()
        .iter()
        .filter(|e| selection.wants(e))
        .cloned()
        .collect();

    let banner = cli.pipe && chosen.len() > 1;
    let mut failed = 0usize;
    for entry in &chosen {
        let outcome = if cli.pipe {
            pipe_entry(extractor, entry, banner)
        } else {
            write_entry(extractor, entry, cli)
        };
        if let Err(e) = outcome {
            failed += 1;
            if !cli.is_very_quiet() {
                eprintln!("error: {}: {e:#}", entry.file_name);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} entries could not be extracted", chosen.len());
    }
    Ok(())
}

fn pipe_entry(extractor: &mut Extractor, entry: &ZipFileEntry, banner: bool) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if banner {
        writeln!(stdout, "--- {} ---", entry.file_name)?;
    }
    extractor.extract_to_writer(entry, &mut stdout)?;
    Ok(())
}

fn write_entry(extractor: &mut Extractor, entry: &ZipFileEntry, cli: &Cli) -> Result<()> {
    let target = output_path(entry, cli.extract_dir.as_deref(), cli.junk_paths)?;

    if target.exists() {
        let reason = match Overwrite::from_cli(cli) {
            Overwrite::Always => None,
            Overwrite::Never => Some("file exists"),
            Overwrite::Ask => Some("use -o to overwrite"),
        };
        if let Some(reason) = reason {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} ({reason})", entry.file_name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.file_name);
    }
    extractor
        .extract_to_file(entry, &target)
        .with_context(|| format!("cannot write {}", target.display()))
}

/// Where an entry lands on disk. Names that would escape the destination
/// are refused.
fn output_path(entry: &ZipFileEntry, dest: Option<&str>, junk_paths: bool) -> Result<PathBuf> {
    let name = if junk_paths {
        entry.file_name.rsplit('/').next().unwrap_or_default()
    } else {
        entry.file_name.as_str()
    };

    let relative = Path::new(name);
    let contained = !relative.has_root()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if name.is_empty() || !contained {
        bail!("refusing to write outside the destination: {}", entry.file_name);
    }

    Ok(match dest {
        Some(dir) => Path::new(dir).join(relative),
        None => relative.to_path_buf(),
    })
}

/// Print the archive contents, either names only or as an `unzip -v`
/// style table.
fn print_listing(extractor: &Extractor, verbose: bool) {
    let entries = extractor.list_files();

    if !verbose {
        for entry in entries {
            println!("{}", entry.file_name);
        }
        return;
    }

    let rule = "-".repeat(78);
    println!(
        "{:>10}  {:<6}  {:>10}  {:>4}  {:<16}  {:<8}  Name",
        "Length", "Method", "Size", "Cmpr", "Date/Time", "CRC-32"
    );
    println!("{rule}");

    let (mut length, mut size, mut files) = (0u64, 0u64, 0usize);
    for entry in entries {
        let (y, mo, d) = entry.mod_date();
        let (h, mi, _) = entry.mod_time();
        let method = match entry.compression_method {
            CompressionMethod::Stored => "Stored".to_string(),
            CompressionMethod::Deflate => "Defl".to_string(),
            CompressionMethod::Unknown(code) => format!("#{code}"),
        };
        println!(
            "{:>10}  {:<6}  {:>10}  {:>4}  {y:04}-{mo:02}-{d:02} {h:02}:{mi:02}  {:08x}  {}",
            entry.uncompressed_size,
            method,
            entry.compressed_size,
            savings(entry.compressed_size.into(), entry.uncompressed_size.into()),
            entry.crc32,
            entry.file_name
        );
        if !entry.is_directory {
            length += u64::from(entry.uncompressed_size);
            size += u64::from(entry.compressed_size);
            files += 1;
        }
    }

    println!("{rule}");
    println!(
        "{length:>10}  {:<6}  {size:>10}  {:>4}  {:<26}  {files} files",
        "",
        savings(size, length),
        ""
    );

    let comment = extractor.comment();
    if !comment.is_empty() {
        println!("{}", String::from_utf8_lossy(comment));
    }
}

/// Space saved by compression, as a percentage.
fn savings(compressed: u64, uncompressed: u64) -> String {
    match (compressed * 100).checked_div(uncompressed) {
        Some(pct) if compressed <= uncompressed => format!("{}%", 100 - pct),
        _ => "0%".to_string(),
    }
}

/// Match `name` against a pattern where `*` is any run of characters and
/// `?` is exactly one.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    // Last `*` seen and the name position it currently absorbs up to.
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ni));
                pi += 1;
            }
            Some(&c) if c == '?' || c == n[ni] => {
                pi += 1;
                ni += 1;
            }
            _ => match star {
                Some((sp, sn)) => {
                    pi = sp + 1;
                    ni = sn + 1;
                    star = Some((sp, sn + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} bytes");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
