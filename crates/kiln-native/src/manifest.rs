//! Artifact manifests.
//!
//! A repository publishes `{version}/files.txt`, one relative artifact path
//! per line. Native library artifacts live at
//! `{flavor}/{classifier}/native/lib/{file}.gz`.

use crate::error::{NativeError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    lines: Vec<String>,
}

impl Manifest {
    /// Blank lines and `#` comments are dropped.
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Entries published for one flavor and classifier.
    pub fn entries_for(&self, flavor: &str, classifier: &str) -> Vec<&str> {
        let prefix = format!("{flavor}/{classifier}/");
        self.lines
            .iter()
            .map(String::as_str)
            .filter(|l| l.starts_with(&prefix))
            .collect()
    }

    /// Find a published CUDA flavor with the same major version as `flavor`.
    ///
    /// `cu118` accepts any `cu11<digit>{abi_suffix}` that ships
    /// `{classifier}/native/lib/{native_lib}.gz`. The first match in
    /// manifest order wins.
    pub fn match_cuda_flavor(
        &self,
        flavor: &str,
        abi_suffix: &str,
        classifier: &str,
        native_lib: &str,
    ) -> Option<String> {
        let major = flavor.get(..4)?;
        let tail = format!("/{classifier}/native/lib/{native_lib}.gz");
        self.lines.iter().find_map(|line| {
            let candidate = line.strip_suffix(&tail)?;
            let rest = candidate.strip_prefix(major)?;
            let mut chars = rest.chars();
            let minor = chars.next()?;
            (minor.is_ascii_digit() && chars.as_str() == abi_suffix)
                .then(|| candidate.to_string())
        })
    }
}

/// Local file name of a manifest entry: the last path segment without
/// `.gz`, percent-decoded.
pub fn artifact_file_name(line: &str) -> Result<String> {
    let last = line.rsplit('/').next().unwrap_or(line);
    let stem = last.strip_suffix(".gz").unwrap_or(last);
    let name = percent_decode(stem).ok_or_else(|| NativeError::DownloadFailed {
        url: line.to_string(),
        detail: "malformed percent-encoding in file name".to_string(),
    })?;
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(NativeError::DownloadFailed {
            url: line.to_string(),
            detail: format!("unusable file name `{name}`"),
        });
    }
    Ok(name)
}

/// Decode `%XX` escapes and `+` as space.
fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = std::str::from_utf8(bytes.get(i + 1..i + 3)?).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}
