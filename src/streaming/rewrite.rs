//! HLS manifest rewriting.
//!
//! Every URI line of a master or variant playlist is rewritten to point at the
//! proxy. Rules, first match wins, query strings kept verbatim:
//!
//! 1. already under `/api/media/stream/`: unchanged
//! 2. absolute `http(s)://` URL containing `/videos/{id}/`: proxy base plus the
//!    path after that segment
//! 3. absolute path starting with `/videos/{id}/`: as above
//! 4. relative path: proxy base plus the line
//! 5. any other absolute path: proxy base plus its last component
//! 6. anything else: unchanged
//!
//! Tag lines (`#...`) and blank lines pass through untouched.

/// Path prefix of the proxy's own stream routes.
pub const PROXY_STREAM_PREFIX: &str = "/api/media/stream/";

/// Per-request inputs to manifest rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    pub item_id: String,
    /// `{scheme}://{host}/api/media/stream/{item_id}`, no trailing slash.
    pub proxy_base: String,
}

impl RewriteContext {
    pub fn new(item_id: impl Into<String>, proxy_base: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            proxy_base: proxy_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn proxied(&self, path: &str, query: &str) -> String {
        format!("{}/{}{}", self.proxy_base, path.trim_start_matches('/'), query)
    }
}

/// Split `path?query` into `("path", "?query")`.
fn split_query(line: &str) -> (&str, &str) {
    match line.find('?') {
        Some(pos) => line.split_at(pos),
        None => (line, ""),
    }
}

/// Rewrite one manifest line.
pub fn rewrite_line(line: &str, ctx: &RewriteContext) -> String {
    let line = line.trim_end_matches('\r');
    let uri = line.trim();

    if uri.is_empty() || uri.starts_with('#') {
        return line.to_string();
    }

    if uri.contains(PROXY_STREAM_PREFIX) {
        return line.to_string();
    }

    let (path, query) = split_query(uri);
    // ASCII lowercasing keeps byte offsets, so positions map back onto `path`.
    let lower = path.to_ascii_lowercase();
    let marker = format!("/videos/{}/", ctx.item_id.to_ascii_lowercase());

    if lower.starts_with("http://") || lower.starts_with("https://") {
        return match lower.find(&marker) {
            Some(pos) => ctx.proxied(&path[pos + marker.len()..], query),
            None => line.to_string(),
        };
    }

    if lower.starts_with(&marker) {
        return ctx.proxied(&path[marker.len()..], query);
    }

    if path.starts_with('/') {
        return match path.rsplit('/').next() {
            Some(last) if !last.is_empty() => ctx.proxied(last, query),
            _ => line.to_string(),
        };
    }

    if uri.contains("://") {
        return line.to_string();
    }

    ctx.proxied(uri, "")
}

/// Rewrite a whole manifest, keeping its line structure.
pub fn rewrite_manifest(manifest: &str, ctx: &RewriteContext) -> String {
    let mut out = String::with_capacity(manifest.len() + manifest.len() / 2);
    for (i, line) in manifest.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&rewrite_line(line, ctx));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RewriteContext {
        RewriteContext::new("ITEM123", "https://host/api/media/stream/ITEM123")
    }

    #[test]
    fn test_relative_line_keeps_query() {
        assert_eq!(
            rewrite_line("hls1/main/0.ts?runtimeTicks=500", &ctx()),
            "https://host/api/media/stream/ITEM123/hls1/main/0.ts?runtimeTicks=500"
        );
    }

    #[test]
    fn test_already_proxied_unchanged() {
        let line = "https://other/api/media/stream/ITEM123/main.m3u8?x=1";
        assert_eq!(rewrite_line(line, &ctx()), line);
        assert_eq!(rewrite_line("/api/media/stream/X/0.ts", &ctx()), "/api/media/stream/X/0.ts");
    }

    #[test]
    fn test_absolute_upstream_url() {
        assert_eq!(
            rewrite_line(
                "http://jellyfin:8096/Videos/item123/main.m3u8?MediaSourceId=ms&api_key=k",
                &ctx()
            ),
            "https://host/api/media/stream/ITEM123/main.m3u8?MediaSourceId=ms&api_key=k"
        );
    }

    #[test]
    fn test_absolute_url_for_other_item_unchanged() {
        let line = "https://cdn.example.com/Videos/OTHER/main.m3u8";
        assert_eq!(rewrite_line(line, &ctx()), line);
    }

    #[test]
    fn test_media_path_prefix() {
        assert_eq!(
            rewrite_line("/videos/ITEM123/hls1/main/7.ts?runtimeTicks=1", &ctx()),
            "https://host/api/media/stream/ITEM123/hls1/main/7.ts?runtimeTicks=1"
        );
    }

    #[test]
    fn test_other_absolute_path_uses_last_component() {
        assert_eq!(
            rewrite_line("/some/other/place/seg-4.ts?t=2", &ctx()),
            "https://host/api/media/stream/ITEM123/seg-4.ts?t=2"
        );
    }

    #[test]
    fn test_unmatched_shapes_unchanged() {
        assert_eq!(rewrite_line("/trailing/", &ctx()), "/trailing/");
        assert_eq!(rewrite_line("skd://key-id", &ctx()), "skd://key-id");
    }

    #[test]
    fn test_tags_and_blanks_pass_through() {
        assert_eq!(rewrite_line("#EXTM3U", &ctx()), "#EXTM3U");
        assert_eq!(
            rewrite_line("#EXT-X-STREAM-INF:BANDWIDTH=1000", &ctx()),
            "#EXT-X-STREAM-INF:BANDWIDTH=1000"
        );
        assert_eq!(rewrite_line("", &ctx()), "");
    }

    #[test]
    fn test_crlf_is_trimmed() {
        assert_eq!(
            rewrite_line("main.m3u8\r", &ctx()),
            "https://host/api/media/stream/ITEM123/main.m3u8"
        );
    }

    #[test]
    fn test_rewrite_manifest() {
        let manifest = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nmain.m3u8?api_key=k\n";
        let rewritten = rewrite_manifest(manifest, &ctx());
        assert_eq!(
            rewritten,
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nhttps://host/api/media/stream/ITEM123/main.m3u8?api_key=k\n"
        );
    }
}
