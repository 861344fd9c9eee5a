//! Catalog and loan files on disk.

use crate::{Book, Loan};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn books(&self) -> PathBuf { self.root.join("books.json") }
    pub fn loans(&self) -> PathBuf { self.root.join("loans.json") }
}

/// On-disk shape of the loan file. Other top-level keys (such as a fine
/// policy) belong to other components and are ignored.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LoanFile {
    #[serde(default)]
    loans: Vec<Loan>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoanInput {
    Bare(Vec<Loan>),
    Wrapped(LoanFile),
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut f = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let json = serde_json::to_string_pretty(value)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

/// Missing file means an empty catalog.
pub fn load_books(path: &Path) -> Result<Vec<Book>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let books = serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {}", path.display()))?;
    Ok(books)
}

pub fn save_books(path: &Path, books: &[Book]) -> Result<()> {
    write_json(path, &books)
}

/// Accepts `{"loans": [...]}` or a bare array. Missing file means no loans.
pub fn load_loans(path: &Path) -> Result<Vec<Loan>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let input: LoanInput =
        serde_json::from_reader(BufReader::new(f)).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match input {
        LoanInput::Wrapped(file) => file.loans,
        LoanInput::Bare(loans) => loans,
    })
}

pub fn save_loans(path: &Path, loans: &[Loan]) -> Result<()> {
    write_json(path, &LoanFile { loans: loans.to_vec() })
}

/// Reads books to import from a `.json` file (array or single object), a
/// `.jsonl` file (one book per line), or a directory of such files.
pub fn read_books_input(path: &Path) -> Result<Vec<Book>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        anyhow::bail!("input {} does not exist", path.display());
    }

    let mut books = Vec::new();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut books)?;
        } else {
            read_json(&file, &mut books)?;
        }
    }
    tracing::info!(books = books.len(), input = %path.display(), "read import input");
    Ok(books)
}

fn read_jsonl(file: &Path, books: &mut Vec<Book>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let book: Book = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), lineno + 1))?;
        books.push(book);
    }
    Ok(())
}

fn read_json(file: &Path, books: &mut Vec<Book>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value =
        serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                books.push(serde_json::from_value(v)?);
            }
        }
        serde_json::Value::Object(_) => books.push(serde_json::from_value(json)?),
        _ => tracing::warn!(file = %file.display(), "skipping input that is neither object nor array"),
    }
    Ok(())
}
