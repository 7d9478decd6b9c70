//! Media id extraction from user supplied URLs.
//!
//! The room core treats resolution as a pure, fallible function. Any
//! `Fn(&str) -> Option<String>` can be plugged in; `YoutubeIdResolver` is
//! the default.

use url::Url;

pub trait MediaIdResolver: Send {
    /// Returns the media id referenced by `url`, or `None` if the URL does
    /// not point at playable media.
    fn resolve(&self, url: &str) -> Option<String>;
}

impl<F> MediaIdResolver for F
where
    F: Fn(&str) -> Option<String> + Send,
{
    fn resolve(&self, url: &str) -> Option<String> {
        self(url)
    }
}

/// Extracts video ids from the usual YouTube URL forms.
#[derive(Clone, Copy, Debug, Default)]
pub struct YoutubeIdResolver;

const PATH_PREFIXES: [&str; 4] = ["embed", "shorts", "live", "v"];

impl YoutubeIdResolver {
    fn parse(input: &str) -> Option<Url> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        match Url::parse(input) {
            Ok(url) => Some(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("https://{}", input)).ok()
            }
            Err(_) => None,
        }
    }

    fn canonical_host(url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        let host = ["www.", "m.", "music."]
            .iter()
            .find_map(|prefix| host.strip_prefix(prefix))
            .map(str::to_string)
            .unwrap_or(host);
        Some(host)
    }

    fn valid_id(candidate: &str) -> Option<String> {
        let ok = !candidate.is_empty()
            && candidate.len() <= 64
            && candidate
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        ok.then(|| candidate.to_string())
    }
}

impl MediaIdResolver for YoutubeIdResolver {
    fn resolve(&self, input: &str) -> Option<String> {
        let url = Self::parse(input)?;
        let host = Self::canonical_host(&url)?;
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        match host.as_str() {
            "youtu.be" => Self::valid_id(segments.next()?),
            "youtube.com" | "youtube-nocookie.com" => {
                let first = segments.next()?;
                if first == "watch" {
                    let (_, v) = url.query_pairs().find(|(k, _)| k == "v")?;
                    Self::valid_id(&v)
                } else if PATH_PREFIXES.contains(&first) {
                    Self::valid_id(segments.next()?)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(url: &str) -> Option<String> {
        YoutubeIdResolver.resolve(url)
    }

    #[test]
    fn test_watch_urls() {
        assert_eq!(
            resolve("https://youtube.com/watch?v=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            resolve("https://www.youtube.com/watch?list=PL1&v=dQw4w9WgXcQ&t=42"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            resolve("https://m.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn test_short_and_path_forms() {
        assert_eq!(resolve("https://youtu.be/xyz_9-A?t=3"), Some("xyz_9-A".to_string()));
        assert_eq!(
            resolve("https://www.youtube.com/embed/abcdef"),
            Some("abcdef".to_string())
        );
        assert_eq!(
            resolve("https://youtube.com/shorts/short1"),
            Some("short1".to_string())
        );
        assert_eq!(resolve("youtube.com/watch?v=noscheme"), Some("noscheme".to_string()));
    }

    #[test]
    fn test_rejects_unrelated_or_malformed() {
        assert_eq!(resolve(""), None);
        assert_eq!(resolve("   "), None);
        assert_eq!(resolve("https://vimeo.com/12345"), None);
        assert_eq!(resolve("https://youtube.com/watch"), None);
        assert_eq!(resolve("https://youtube.com/watch?v="), None);
        assert_eq!(resolve("https://youtube.com/watch?v=bad%20id"), None);
        assert_eq!(resolve("https://youtube.com/channel/UC123"), None);
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |url: &str| url.strip_prefix("media:").map(str::to_string);
        assert_eq!(resolver.resolve("media:42"), Some("42".to_string()));
        assert_eq!(resolver.resolve("other"), None);
    }
}
