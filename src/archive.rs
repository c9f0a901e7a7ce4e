use std::io::{Cursor, Read as _};
use std::path::Path;

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};
use crate::formats::ArchiveFile;
use crate::storage::Storage;

/// `s3://`, `gs://`, ... but not `file://`.
pub fn is_remote_path(path: &str) -> bool {
    path.contains("://") && !path.starts_with("file://")
}

pub fn local_path(path: &str) -> &str {
    path.strip_prefix("file://").unwrap_or(path)
}

/// Text after the last `/` of an archive entry name.
pub fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Lowercased extension, or empty when the name has no `.`.
pub fn file_type(name: &str) -> String {
    let lower = name.to_lowercase();
    match lower.rsplit_once('.') {
        Some((_, ext)) if ext != lower => ext.to_owned(),
        _ => String::new(),
    }
}

pub fn list_files(bytes: &[u8]) -> Result<Vec<ArchiveFile>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut files = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let name = basename(entry.name()).to_owned();
        let file_type = file_type(&name);
        files.push(ArchiveFile {
            name,
            size: entry.size(),
            file_type,
        });
    }
    Ok(files)
}

/// Writes every non-directory entry whose basename matches `pattern` to
/// `{destination}/{basename}` and returns the written paths in archive order.
pub async fn extract_files(
    bytes: &[u8],
    pattern: &str,
    destination: &str,
    storage: &Storage,
) -> Result<Vec<String>> {
    let matched = read_matching(bytes, pattern)?;
    if matched.is_empty() {
        tracing::info!(pattern, "no archive entries matched");
        return Ok(Vec::new());
    }

    let remote = is_remote_path(destination);
    let out_dir = match destination.trim_end_matches('/') {
        "" if destination.starts_with('/') => "/",
        trimmed => trimmed,
    };

    let mut written = Vec::with_capacity(matched.len());
    if remote {
        for (name, contents) in matched {
            let out_path = format!("{out_dir}/{name}");
            storage.put(&out_path, &contents).await?;
            tracing::info!(path = %out_path, bytes = contents.len(), "extracted");
            written.push(out_path);
        }
    } else {
        let out_dir = Path::new(local_path(out_dir));
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|err| Error::io(format!("create output dir: {}", out_dir.display()), err))?;
        for (name, contents) in matched {
            let out_path = out_dir.join(&name);
            tokio::fs::write(&out_path, &contents)
                .await
                .map_err(|err| Error::io(format!("write {}", out_path.display()), err))?;
            tracing::info!(path = %out_path.display(), bytes = contents.len(), "extracted");
            written.push(out_path.to_string_lossy().into_owned());
        }
    }
    Ok(written)
}

/// Writes one blob to a local path (parents created) or through `storage`.
pub async fn write_bytes_to_path(bytes: &[u8], path: &str, storage: &Storage) -> Result<()> {
    if is_remote_path(path) {
        storage.put(path, bytes).await?;
    } else {
        let path = Path::new(local_path(path));
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| Error::io(format!("create dir: {}", parent.display()), err))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|err| Error::io(format!("write {}", path.display()), err))?;
    }
    tracing::info!(%path, bytes = bytes.len(), "wrote archive");
    Ok(())
}

fn read_matching(bytes: &[u8], pattern: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let pattern = Glob::new(pattern);
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut matched = Vec::new();
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        let name = basename(entry.name()).to_owned();
        if !pattern.matches(&name) {
            continue;
        }
        let mut contents = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut contents)
            .map_err(|err| Error::InvalidArchive(ZipError::Io(err)))?;
        matched.push((name, contents));
    }
    Ok(matched)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Star,
    AnyChar,
    Literal(char),
    Class { negated: bool, ranges: Vec<(char, char)> },
}

impl Token {
    fn matches(&self, ch: char) -> bool {
        match self {
            Token::Star | Token::AnyChar => true,
            Token::Literal(lit) => *lit == ch,
            Token::Class { negated, ranges } => {
                ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&ch)) != *negated
            }
        }
    }
}

/// Shell-style wildcard: `*`, `?`, `[seq]`, `[!seq]`. An unclosed `[` is literal.
#[derive(Debug, Clone)]
pub struct Glob {
    tokens: Vec<Token>,
}

impl Glob {
    pub fn new(pattern: &str) -> Self {
        let chars: Vec<char> = pattern.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' => {
                    if tokens.last() != Some(&Token::Star) {
                        tokens.push(Token::Star);
                    }
                }
                '?' => tokens.push(Token::AnyChar),
                '[' => {
                    if let Some((token, end)) = parse_class(&chars, i) {
                        tokens.push(token);
                        i = end;
                    } else {
                        tokens.push(Token::Literal('['));
                    }
                }
                ch => tokens.push(Token::Literal(ch)),
            }
            i += 1;
        }
        Self { tokens }
    }

    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let (mut p, mut t) = (0, 0);
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::Star) => {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                Some(token) if token.matches(text[t]) => {
                    p += 1;
                    t += 1;
                    continue;
                }
                _ => {}
            }
            match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            }
        }

        self.tokens[p..].iter().all(|token| *token == Token::Star)
    }
}

// Returns the class token and the index of its closing `]`.
fn parse_class(chars: &[char], open: usize) -> Option<(Token, usize)> {
    let mut j = open + 1;
    let negated = chars.get(j) == Some(&'!');
    if negated {
        j += 1;
    }
    let start = j;
    // A `]` right after the opening bracket is a member, not the terminator.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    while j < chars.len() && chars[j] != ']' {
        j += 1;
    }
    if j >= chars.len() {
        return None;
    }

    let body = &chars[start..j];
    let mut ranges = Vec::new();
    let mut k = 0;
    while k < body.len() {
        if k + 2 < body.len() && body[k + 1] == '-' {
            ranges.push((body[k], body[k + 2]));
            k += 3;
        } else {
            ranges.push((body[k], body[k]));
            k += 1;
        }
    }
    Some((Token::Class { negated, ranges }, j))
}
