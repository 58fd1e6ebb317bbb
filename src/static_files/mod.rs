//! The static-file server: the largest single component, combining path
//! resolution, the cache-coherence protocol, compression variant selection,
//! and template expansion behind one handler-shaped entry point.
//!
//! Every served file passes a Unix-only permissions check (`cfg(unix)`,
//! see `check_permissions` below) before its bytes are read off disk, on
//! top of the in-memory cache, compression, and templating this module
//! builds around that read.

mod cache;
mod template;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::context::Context;
use crate::error::{HttpError, ProtocolError};
use crate::filetype;
use crate::log::Logger;
use crate::path as path_safety;
use crate::request::Method;

use cache::{CacheStatus, FileCache};

struct Settings {
    template_extensions: HashSet<String>,
    compressible_extensions: HashSet<String>,
    start_delimiter: String,
    end_delimiter: String,
    default_file_name: String,
    default_extension: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            template_extensions: parse_extension_list("html;htm"),
            compressible_extensions: parse_extension_list("html;htm;css;js;svg;txt"),
            start_delimiter: "${{".to_string(),
            end_delimiter: "}}".to_string(),
            default_file_name: "index".to_string(),
            default_extension: "html".to_string(),
        }
    }
}

fn parse_extension_list(spec: &str) -> HashSet<String> {
    spec.split(';').map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect()
}

pub struct StaticFileServer {
    root: PathBuf,
    settings: RwLock<Settings>,
    cache: FileCache,
    logger: std::sync::Arc<Logger>,
}

impl StaticFileServer {
    pub fn new(root: PathBuf, logger: std::sync::Arc<Logger>) -> Self {
        StaticFileServer { root, settings: RwLock::new(Settings::default()), cache: FileCache::new(), logger }
    }

    /// Reassigning any tuning property clears the cache entirely; concurrent
    /// requests may repopulate it under the new rules.
    pub fn set_template_extensions(&self, spec: &str) {
        self.settings.write().unwrap().template_extensions = parse_extension_list(spec);
        self.cache.clear();
    }

    pub fn set_compressible_extensions(&self, spec: &str) {
        self.settings.write().unwrap().compressible_extensions = parse_extension_list(spec);
        self.cache.clear();
    }

    pub fn set_delimiters(&self, start: &str, end: &str) {
        let mut settings = self.settings.write().unwrap();
        settings.start_delimiter = start.to_string();
        settings.end_delimiter = end.to_string();
        drop(settings);
        self.cache.clear();
    }

    pub fn set_default_file_name(&self, name: &str) {
        self.settings.write().unwrap().default_file_name = name.to_string();
        self.cache.clear();
    }

    pub fn set_default_extension(&self, ext: &str) {
        self.settings.write().unwrap().default_extension = ext.to_string();
        self.cache.clear();
    }

    /// The handler entry point; suitable for wrapping with `handler::handler`.
    pub async fn handle(&self, ctx: &mut Context<'_>) -> Result<(), HttpError> {
        if ctx.request.method != Method::Get {
            return Err(ProtocolError::new(405, "Invalid HTTP request: Only GET method is allowed for serving").into());
        }

        if !path_safety::is_safe(&ctx.request.path) {
            return Err(ProtocolError::new(400, "Invalid Request: File name is invalid").into());
        }

        let http_path = format!("/{}", ctx.request.path);
        self.update_cache(&http_path).await?;

        let Some(entry) = self.cache.lookup(&http_path) else {
            return ctx.send_response(404, "Not Found", b"not found").await;
        };
        entry.record_hit();

        let accept_br = ctx.request.accept_encoding.contains("br");
        let accept_gzip = ctx.request.accept_encoding.contains("gzip");

        let (body, encoding): (&[u8], Option<&str>) = if accept_br && entry.brotli.is_some() {
            (entry.brotli.as_deref().unwrap(), Some("br"))
        } else if accept_gzip && entry.gzip.is_some() {
            (entry.gzip.as_deref().unwrap(), Some("gzip"))
        } else {
            (&entry.uncompressed, None)
        };

        ctx.with_response_mut(|r| {
            if let Some(enc) = encoding {
                r.set_content_encoding(enc);
            }
            if let Some(mime) = filetype::from_extension(&entry.extension) {
                r.set_content_type(&mime);
            }
            r.set_header("Cross-Origin-Opener-Policy", "same-origin");
            r.set_header("Cross-Origin-Embedder-Policy", "require-corp");
        })?;

        ctx.send_bytes(body).await
    }

    async fn update_cache(&self, http_path: &str) -> Result<(), HttpError> {
        if matches!(self.cache.check_freshness(http_path), CacheStatus::Fresh(_)) {
            return Ok(());
        }

        let Some((canonical_path, extension)) = self.resolve_path(http_path).await else {
            return Ok(());
        };

        let (template_extensions, start_delim, end_delim, compressible_extensions) = {
            let settings = self.settings.read().unwrap();
            (settings.template_extensions.clone(), settings.start_delimiter.clone(), settings.end_delimiter.clone(), settings.compressible_extensions.clone())
        };

        let (entry, had_precompressed_gzip) =
            cache::load_from_disk(&canonical_path, http_path, &extension, &template_extensions, &start_delim, &end_delim, &self.root, &self.logger).await?;

        let mtime = entry.mtime;
        let uncompressed_len = entry.uncompressed.len();
        let uncompressed_for_compression = if !had_precompressed_gzip && compressible_extensions.contains(&extension) { Some(entry.uncompressed.clone()) } else { None };

        self.cache.insert(entry);

        if let Some(data) = uncompressed_for_compression {
            let gzip_bytes = cache::gzip_compress(&data);
            self.cache.store_gzip_if_smaller(http_path, mtime, gzip_bytes, uncompressed_len);
        }

        Ok(())
    }

    fn default_extension(&self) -> String {
        self.settings.read().unwrap().default_extension.clone()
    }

    /// Path-resolution fallback chain: direct join, directory-style join of
    /// the default file name (`index.html`, not bare `index`), then the
    /// direct join with the default extension appended. Returns the
    /// extension of whichever file actually matched, not a guess from the
    /// request path, so the cache entry's MIME type always matches the bytes
    /// on disk.
    async fn resolve_path(&self, http_path: &str) -> Option<(PathBuf, String)> {
        let relative = http_path.trim_start_matches('/');

        let direct = self.root.join(relative);
        if tokio::fs::metadata(&direct).await.map(|m| m.is_file()).unwrap_or(false) {
            return Some((direct.clone(), extension_of(&direct, &self.default_extension())));
        }

        let (default_file_name, default_extension) = {
            let settings = self.settings.read().unwrap();
            (settings.default_file_name.clone(), settings.default_extension.clone())
        };

        let dir_style = self.root.join(relative).join(format!("{}.{}", default_file_name, default_extension));
        if tokio::fs::metadata(&dir_style).await.map(|m| m.is_file()).unwrap_or(false) {
            return Some((dir_style.clone(), extension_of(&dir_style, &default_extension)));
        }

        let with_extension = self.root.join(format!("{}.{}", relative, default_extension));
        if tokio::fs::metadata(&with_extension).await.map(|m| m.is_file()).unwrap_or(false) {
            return Some((with_extension.clone(), extension_of(&with_extension, &default_extension)));
        }

        None
    }
}

/// The lowercased extension of a resolved file's own name, falling back to
/// `fallback` only when the name has no extension at all.
fn extension_of(path: &Path, fallback: &str) -> String {
    match path.file_name().and_then(|n| n.to_str()).and_then(|s| s.rsplit_once('.')) {
        Some((_, ext)) if !ext.is_empty() => ext.to_lowercase(),
        _ => fallback.to_lowercase(),
    }
}

/// Rejects files without `ugo+r`, and files that are `o+x` but not `u+x`.
/// Checked by `cache::load_from_disk` before a file's bytes are read off
/// disk.
#[cfg(unix)]
pub(crate) fn check_permissions(metadata: &std::fs::Metadata) -> Result<(), &'static str> {
    use std::os::unix::fs::MetadataExt;
    let mode = metadata.mode();
    if (mode & 0o444) != 0o444 {
        return Err("not ugo+r");
    }
    if (mode & 0o101) == 0o001 {
        return Err("o+x but u-x");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_list_parsing_lowercases_and_trims() {
        let set = parse_extension_list("HTML; Css ;js");
        assert!(set.contains("html"));
        assert!(set.contains("css"));
        assert!(set.contains("js"));
    }

    #[test]
    fn extension_of_falls_back_when_absent() {
        assert_eq!(extension_of(Path::new("/dir/noext"), "html"), "html");
        assert_eq!(extension_of(Path::new("/dir/file.CSS"), "html"), "css");
    }
}
