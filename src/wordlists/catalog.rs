use super::{Category, SizeClass, fallback, scoring};
use crate::config::types::{CategoryRule, WordlistsConfig};
use crate::core::context::TargetContext;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const MAX_DEPTH: usize = 8;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub path: PathBuf,
    /// Path below its root; classification and context bonuses look at this.
    pub relative: PathBuf,
    pub category: Category,
    pub size_class: SizeClass,
    pub estimated_lines: u64,
    pub source_root: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectionRequest {
    pub category: Category,
    pub preferred_size: Option<SizeClass>,
}

impl SelectionRequest {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            preferred_size: None,
        }
    }

    pub fn prefer(mut self, size: Option<SizeClass>) -> Self {
        self.preferred_size = size;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    File {
        candidate: Candidate,
        score: f64,
        /// Picked from the `unknown` bucket because the category had no files.
        from_unknown: bool,
    },
    Builtin {
        category: Category,
        words: &'static [&'static str],
    },
}

impl Selection {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Selection::Builtin { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Selection::File { candidate, .. } => Some(&candidate.path),
            Selection::Builtin { .. } => None,
        }
    }
}

/// Wordlist files under the configured roots, indexed on first use.
pub struct Catalog {
    config: WordlistsConfig,
    index: OnceLock<Vec<Candidate>>,
}

impl Catalog {
    pub fn new(config: WordlistsConfig) -> Self {
        Self {
            config,
            index: OnceLock::new(),
        }
    }

    #[cfg(test)]
    pub fn is_indexed(&self) -> bool {
        self.index.get().is_some()
    }

    pub fn candidates(&self) -> &[Candidate] {
        self.index.get_or_init(|| {
            let index = build_index(&self.config);
            tracing::info!(
                "Indexed {} wordlists across {} roots",
                index.len(),
                self.config.roots.len()
            );
            index
        })
    }

    /// Candidates for `request`, best first, with the flag telling whether the
    /// `unknown` bucket stood in for an empty category.
    pub fn rank(&self, request: &SelectionRequest, ctx: &TargetContext) -> (Vec<(Candidate, f64)>, bool) {
        let index = self.candidates();
        let mut from_unknown = false;
        let mut pool: Vec<&Candidate> = index.iter().filter(|c| c.category == request.category).collect();
        if pool.is_empty() && request.category != Category::Unknown {
            pool = index.iter().filter(|c| c.category == Category::Unknown).collect();
            from_unknown = !pool.is_empty();
        }

        let weights = &self.config.weights;
        let peak = request.preferred_size.unwrap_or(weights.size_peak);
        let mut scored: Vec<(&Candidate, f64)> = pool
            .into_iter()
            .map(|c| {
                let priority = self
                    .config
                    .roots
                    .get(c.source_root)
                    .map(|r| r.priority)
                    .unwrap_or(0.0);
                (c, scoring::score(c, priority, ctx, peak, weights))
            })
            .collect();
        scored.sort_by(|a, b| scoring::rank_order(*a, *b));

        let ranked = scored.into_iter().map(|(c, s)| (c.clone(), s)).collect();
        (ranked, from_unknown)
    }

    pub fn select(&self, request: &SelectionRequest, ctx: &TargetContext) -> Selection {
        let (ranked, from_unknown) = self.rank(request, ctx);
        match ranked.into_iter().next() {
            Some((candidate, score)) => Selection::File {
                candidate,
                score,
                from_unknown,
            },
            None => {
                tracing::warn!(
                    "No {} wordlist found, using built-in fallback",
                    request.category
                );
                Selection::Builtin {
                    category: request.category,
                    words: fallback::builtin(request.category),
                }
            }
        }
    }
}

fn build_index(config: &WordlistsConfig) -> Vec<Candidate> {
    let mut index = Vec::new();
    for (source_root, root) in config.roots.iter().enumerate() {
        if !root.path.is_dir() {
            tracing::debug!("Wordlist root {:?} not present", root.path);
            continue;
        }
        let mut files = Vec::new();
        collect_files(&root.path, &config.extensions, 0, &mut files);
        files.sort();

        for path in files {
            let relative = path.strip_prefix(&root.path).unwrap_or(&path).to_path_buf();
            let estimated_lines = match estimate_lines(&path, config.sample_bytes) {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::debug!("Skipping unreadable wordlist {:?}: {}", path, e);
                    continue;
                }
            };
            index.push(Candidate {
                category: classify(&relative, &config.categories),
                size_class: SizeClass::from_lines(
                    estimated_lines,
                    config.small_max_lines,
                    config.medium_max_lines,
                ),
                estimated_lines,
                source_root,
                relative,
                path,
            });
        }
    }
    index
}

fn collect_files(dir: &Path, extensions: &[String], depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_DEPTH {
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read {:?}: {}", dir, e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            collect_files(&path, extensions, depth + 1, out);
        } else if (file_type.is_file() || path.is_file()) && has_extension(&path, extensions) {
            out.push(path);
        }
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    extensions.iter().any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

/// Lower-cased alphanumeric runs of a path.
pub fn tokenize(path: &Path) -> Vec<String> {
    path.to_string_lossy()
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// First rule with a keyword that starts one of the path tokens wins.
pub fn classify(relative: &Path, rules: &[CategoryRule]) -> Category {
    let tokens = tokenize(relative);
    rules
        .iter()
        .find(|rule| {
            rule.keywords.iter().any(|kw| {
                let kw = kw.to_ascii_lowercase();
                tokens.iter().any(|t| t.starts_with(&kw))
            })
        })
        .map(|rule| rule.category)
        .unwrap_or(Category::Unknown)
}

/// Exact for files up to `sample_bytes`, extrapolated from the first
/// `sample_bytes` otherwise.
fn estimate_lines(path: &Path, sample_bytes: u64) -> io::Result<u64> {
    let len = fs::metadata(path)?.len();
    let mut sample = Vec::new();
    fs::File::open(path)?.take(sample_bytes.max(1)).read_to_end(&mut sample)?;
    let newlines = sample.iter().filter(|b| **b == b'\n').count() as u64;

    if len <= sample.len() as u64 {
        let unterminated = sample.last().is_some_and(|b| *b != b'\n');
        return Ok(newlines + u64::from(unterminated));
    }
    if newlines == 0 {
        return Ok(1);
    }
    let estimate = len as f64 * newlines as f64 / sample.len() as f64;
    Ok(estimate.round() as u64)
}
