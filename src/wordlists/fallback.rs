//! Built-in lists used when no file on disk fits a category.

use super::Category;

const DIRECTORY: &[&str] = &[
    "admin", "login", "index", "home", "test", "backup", "config", "data", "api", "upload",
    "download", "files", "images", "js", "css", "assets", "static", "robots.txt", "sitemap.xml",
    "favicon.ico", ".htaccess", "phpmyadmin", "wp-admin", "administrator", "panel", "dashboard",
];

const SUBDOMAIN: &[&str] = &[
    "www", "mail", "ftp", "localhost", "webmail", "smtp", "pop", "ns1", "ns2", "webdisk", "cpanel",
    "whm", "autodiscover", "autoconfig", "m", "imap", "test", "dev", "admin", "api", "staging",
    "portal", "beta", "blog", "shop", "vpn", "secure", "internal", "intranet", "git", "jenkins",
];

const PARAMETER: &[&str] = &[
    "id", "page", "q", "search", "query", "file", "path", "url", "redirect", "next", "lang",
    "view", "cmd", "exec", "include", "dir", "name", "user", "username", "email", "token",
    "debug", "action", "type", "category", "sort", "order", "limit", "offset",
];

const API: &[&str] = &[
    "api", "api/v1", "api/v2", "v1", "v2", "graphql", "swagger", "swagger.json", "openapi.json",
    "api-docs", "docs", "rest", "health", "status", "users", "auth", "login", "token", "version",
];

const FILE_EXTENSION: &[&str] = &[
    ".php", ".html", ".htm", ".asp", ".aspx", ".jsp", ".txt", ".bak", ".old", ".zip", ".tar.gz",
    ".sql", ".xml", ".json", ".conf", ".config", ".log", ".inc", ".swp",
];

const CREDENTIAL: &[&str] = &[
    "admin", "root", "administrator", "user", "guest", "test", "password", "123456", "letmein",
    "changeme", "default", "qwerty",
];

pub fn builtin(category: Category) -> &'static [&'static str] {
    match category {
        Category::Directory | Category::Unknown => DIRECTORY,
        Category::Subdomain => SUBDOMAIN,
        Category::Parameter => PARAMETER,
        Category::Api => API,
        Category::FileExtension => FILE_EXTENSION,
        Category::Credential => CREDENTIAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_words() {
        for category in [
            Category::Directory,
            Category::Subdomain,
            Category::Parameter,
            Category::Api,
            Category::FileExtension,
            Category::Credential,
            Category::Unknown,
        ] {
            assert!(!builtin(category).is_empty(), "{category}");
        }
    }
}
