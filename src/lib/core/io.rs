//! Shared tabular I/O: tab-separated CSV readers/writers with transparent
//! gzip handling, plus helpers for the `NA` missing-value token used by every
//! matrix contract in the pipeline.

use crate::core::errors::Result;
use crate::core::fs::{is_gzipped, make_parent_dirs};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read};
use std::path::Path;

/// The literal token that encodes a missing value in every flat-file contract.
pub const NA: &str = "NA";

/// Open a path as a buffered line reader, decompressing when the extension
/// says gzip.
pub fn get_line_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let file = File::open(path.as_ref())?;
    if is_gzipped(path.as_ref()) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Build a tab-separated CSV reader over a (possibly gzipped) file.
///
/// `comment` enables `#`-prefixed comment skipping for contracts that carry
/// provenance header lines.
pub fn get_reader<P: AsRef<Path>>(
    path: P,
    has_headers: bool,
    comment: bool,
) -> Result<csv::Reader<Box<dyn Read>>> {
    let file = File::open(path.as_ref())?;
    let raw: Box<dyn Read> = if is_gzipped(path.as_ref()) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .comment(if comment { Some(b'#') } else { None })
        .flexible(true)
        .from_reader(raw))
}

/// Open a buffered writer, creating parent directories when missing.
pub fn get_raw_writer<P: AsRef<Path>>(path: P) -> Result<BufWriter<File>> {
    make_parent_dirs(path.as_ref())?;
    Ok(BufWriter::new(File::create(path.as_ref())?))
}

/// Parse a field that may hold the `NA` token.
pub fn parse_optional_f64(field: &str) -> Option<f64> {
    let trimmed = field.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NA) || trimmed.eq_ignore_ascii_case("nan")
    {
        None
    } else {
        trimmed.parse::<f64>().ok()
    }
}

/// Serialize an optional value, mapping `None` to the `NA` token.
pub fn format_optional_f64(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{}", v),
        None => NA.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_na_round_trip() {
        assert_eq!(parse_optional_f64("NA"), None);
        assert_eq!(parse_optional_f64(""), None);
        assert_eq!(parse_optional_f64("0.25"), Some(0.25));
        assert_eq!(format_optional_f64(None), "NA");
        assert_eq!(format_optional_f64(Some(0.5)), "0.5");
    }
}
