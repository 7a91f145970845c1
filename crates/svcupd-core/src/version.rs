//! Version string scraped from a source file of the managed application.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// Path of the scanned file, relative to the application root
pub const VERSION_FILE: &str = "version/version.go";

/// Version declared in `root`/[`VERSION_FILE`], or an empty string if none is declared.
pub fn get_version(root: &Path) -> Result<String> {
    get_version_from(root, VERSION_FILE)
}

/// Like [`get_version`], reading `relative` under `root`.
pub fn get_version_from(root: &Path, relative: &str) -> Result<String> {
    let path = root.join(relative);
    let file = File::open(&path).map_err(|e| Error::io(&path, e))?;

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(&path, e))?;
        if let Some(version) = parse_version_line(&line) {
            return Ok(version.to_string());
        }
    }
    Ok(String::new())
}

/// Value of a `const version = "<v>"` line. Lines starting with `/` are comments.
fn parse_version_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with('/') {
        return None;
    }

    let rest = line.strip_prefix("const")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix("version")?;
    let rest = rest.trim_start().strip_prefix('=')?;
    let rest = rest.trim_start();

    let quote = rest.chars().next().filter(|&c| matches!(c, '"' | '`'))?;
    let inner = &rest[1..];
    let end = inner.find(quote)?;
    Some(&inner[..end])
}
