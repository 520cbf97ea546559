use anyhow::Context;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Open `input` for buffered reading. `stdin` reads standard input and files
/// ending in `.gz` are transparently decompressed.
pub fn reader(input: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let reader: Box<dyn BufRead> = if input == "stdin" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let path = Path::new(input);
        let file = std::fs::File::open(path)
            .with_context(|| format!("could not open {}", path.display()))?;

        if path.extension() == Some(std::ffi::OsStr::new("gz")) {
            Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        }
    };

    Ok(reader)
}

pub fn writer(output: &str) -> anyhow::Result<Box<dyn Write>> {
    let writer: Box<dyn Write> = if output == "stdout" {
        Box::new(BufWriter::new(std::io::stdout()))
    } else {
        let file = std::fs::File::create(output)
            .with_context(|| format!("could not create {}", output))?;
        Box::new(BufWriter::new(file))
    };

    Ok(writer)
}

/// Locate `<prefix>_<tag>.csv`, falling back to `<prefix>_<tag>.csv.gz`.
///
/// ```
/// let found = qfit::table_path("no/such/prefix", "c");
/// assert!(found.is_none());
/// ```
pub fn table_path(prefix: &str, tag: &str) -> Option<PathBuf> {
    ["csv", "csv.gz"]
        .iter()
        .map(|ext| PathBuf::from(format!("{}_{}.{}", prefix, tag, ext)))
        .find(|p| p.is_file())
}
