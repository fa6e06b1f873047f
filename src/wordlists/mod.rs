pub mod catalog;
pub mod fallback;
pub mod scoring;

pub use catalog::{Catalog, Selection, SelectionRequest};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Directory,
    Subdomain,
    Parameter,
    Api,
    FileExtension,
    Credential,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Directory => "directory",
            Category::Subdomain => "subdomain",
            Category::Parameter => "parameter",
            Category::Api => "api",
            Category::FileExtension => "file-extension",
            Category::Credential => "credential",
            Category::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub fn rank(&self) -> i32 {
        match self {
            SizeClass::Small => 0,
            SizeClass::Medium => 1,
            SizeClass::Large => 2,
        }
    }

    pub fn from_lines(lines: u64, small_max: u64, medium_max: u64) -> Self {
        if lines <= small_max {
            SizeClass::Small
        } else if lines <= medium_max {
            SizeClass::Medium
        } else {
            SizeClass::Large
        }
    }
}
