//! `SHA256SUMS` parsing and lookup.
//!
//! Each line is `<64-hex-digit><space><space><filename>`. Lookup is
//! streaming so it runs in bounded memory regardless of the file's size;
//! [`Sha256Sums`] is a convenience wrapper for callers that have already
//! buffered the (kilobyte-scale) file and want repeated lookups.

use crate::error::{Error, Result};
use crate::model::Sha256Sums;
use std::io::{BufRead, BufReader, Read};

/// Streams `reader` line by line and returns the hex digest recorded for
/// `filename`. A line matches iff, after splitting on a single `' '`
/// character, it has exactly three fields and the third equals `filename`
/// (the format's double space between digest and filename produces an
/// empty middle field). Returns the *first* match. Returns `NotFound` if no
/// line matches, including when `filename` is empty.
pub fn lookup<R: Read>(reader: R, filename: &str) -> Result<String> {
    let buffered = BufReader::new(reader);
    for line in buffered.lines() {
        let line = line.map_err(|e| Error::backend_failure_with_source("shasums", "failed reading SHA256SUMS", e))?;
        let fields: Vec<&str> = line.split(' ').collect();
        if fields.len() == 3 && fields[2] == filename && !filename.is_empty() {
            return Ok(fields[0].to_string());
        }
    }
    Err(Error::not_found(format!("digest for '{filename}' in SHA256SUMS")))
}

impl Sha256Sums {
    /// Parse a fully-buffered `SHA256SUMS` document.
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let buffered = BufReader::new(reader);
        let mut entries = Vec::new();
        for line in buffered.lines() {
            let line = line.map_err(|e| Error::backend_failure_with_source("shasums", "failed reading SHA256SUMS", e))?;
            let fields: Vec<&str> = line.split(' ').collect();
            if fields.len() == 3 {
                entries.push((fields[2].to_string(), fields[0].to_string()));
            }
        }
        Ok(Self { entries })
    }

    /// Look up the digest for `filename`, returning the first match.
    pub fn lookup(&self, filename: &str) -> Result<String> {
        if filename.is_empty() {
            return Err(Error::not_found("digest for '' in SHA256SUMS"));
        }
        self.entries
            .iter()
            .find(|(name, _)| name == filename)
            .map(|(_, digest)| digest.clone())
            .ok_or_else(|| Error::not_found(format!("digest for '{filename}' in SHA256SUMS")))
    }

    /// Serialize back to the `SHA256SUMS` text format, LF-terminated.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (filename, digest) in &self.entries {
            out.push_str(digest);
            out.push_str("  ");
            out.push_str(filename);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "d9e13427a7d011dbd654e591b0337e6074eef8c3b9bb11b2e39eaaf257044fd7  terraform-provider-random_3.1.0_linux_amd64.zip\nabc123  terraform-provider-random_3.1.0_darwin_amd64.zip\n";

    #[test]
    fn lookup_returns_first_match() {
        let digest = lookup(FIXTURE.as_bytes(), "terraform-provider-random_3.1.0_linux_amd64.zip").unwrap();
        assert_eq!(digest, "d9e13427a7d011dbd654e591b0337e6074eef8c3b9bb11b2e39eaaf257044fd7");
    }

    #[test]
    fn lookup_missing_filename_is_not_found() {
        let err = lookup(FIXTURE.as_bytes(), "does-not-exist.zip").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn lookup_empty_filename_is_not_found() {
        let err = lookup(FIXTURE.as_bytes(), "").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn sha256sums_struct_matches_streaming_lookup() {
        let parsed = Sha256Sums::parse(FIXTURE.as_bytes()).unwrap();
        assert_eq!(
            parsed.lookup("terraform-provider-random_3.1.0_linux_amd64.zip").unwrap(),
            lookup(FIXTURE.as_bytes(), "terraform-provider-random_3.1.0_linux_amd64.zip").unwrap()
        );
    }

    #[test]
    fn render_round_trips_through_parse() {
        let parsed = Sha256Sums::parse(FIXTURE.as_bytes()).unwrap();
        let rendered = parsed.render();
        let reparsed = Sha256Sums::parse(rendered.as_bytes()).unwrap();
        assert_eq!(parsed, reparsed);
    }
}
