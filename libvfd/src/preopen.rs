//! Longest-prefix selection of the preopen that covers a path.

use crate::Fd;
use crate::error::{Error, Result};

/// Pick the preopen that most specifically covers `path` and return its fd
/// with the path relative to it.
///
/// `preopens` must yield the most recently registered preopen first; on
/// equal prefix lengths the earlier item wins. The relative remainder is
/// never empty: a path naming the preopen itself yields `"."`.
pub fn find_rel_path<'a, I>(preopens: I, path: &str) -> Result<(Fd, String)>
where
    I: IntoIterator<Item = (Fd, &'a str)>,
{
    let relative_query = path.starts_with("./") || path == ".";
    let mut best: Option<(Fd, usize)> = None;
    for (fd, mut prefix) in preopens {
        if !relative_query {
            if let Some(rest) = prefix.strip_prefix("./") {
                prefix = rest;
            } else if prefix == "." {
                prefix = "";
            }
        }
        let Some(len) = matched_len(path, prefix) else {
            continue;
        };
        if best.is_none_or(|(_, best_len)| len > best_len) {
            best = Some((fd, len));
        }
    }

    let (fd, len) = best.ok_or_else(|| Error::NoPreopen(path.to_string()))?;
    let rest = path[len..].trim_start_matches('/');
    let rest = if rest.is_empty() { "." } else { rest };
    Ok((fd, rest.to_string()))
}

/// Length of `prefix` (trailing slashes ignored) when it ends on a segment
/// boundary of `path`.
fn matched_len(path: &str, prefix: &str) -> Option<usize> {
    if !path.starts_with(prefix) {
        return None;
    }
    let len = prefix.trim_end_matches('/').len();
    match path.as_bytes().get(len) {
        None | Some(b'/') => Some(len),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(preopens: &[(Fd, &str)], path: &str) -> Result<(Fd, String)> {
        find_rel_path(preopens.iter().rev().copied(), path)
    }

    #[test]
    fn longest_prefix_wins() {
        let preopens = [(3, "/a"), (4, "/a/b")];
        assert_eq!(find(&preopens, "/a/b/c.txt").unwrap(), (4, "c.txt".into()));
        assert_eq!(find(&preopens, "/a/c.txt").unwrap(), (3, "c.txt".into()));

        let reversed = [(3, "/a/b"), (4, "/a")];
        assert_eq!(find(&reversed, "/a/b/c.txt").unwrap(), (3, "c.txt".into()));
    }

    #[test]
    fn no_match_fails() {
        let preopens = [(3, "/a"), (4, "/a/b")];
        assert!(matches!(find(&preopens, "/q"), Err(Error::NoPreopen(_))));
        assert!(find(&[], "/a").is_err());
    }

    #[test]
    fn prefix_must_end_on_segment_boundary() {
        let preopens = [(3, "/a")];
        assert!(find(&preopens, "/ab").is_err());
        assert_eq!(find(&preopens, "/a").unwrap(), (3, ".".into()));
        assert_eq!(find(&preopens, "/a//x").unwrap(), (3, "x".into()));
    }

    #[test]
    fn trailing_slash_in_prefix_is_ignored() {
        let preopens = [(3, "/data/")];
        assert_eq!(find(&preopens, "/data/x/y").unwrap(), (3, "x/y".into()));
        assert_eq!(find(&[(3, "/")], "/etc/hosts").unwrap(), (3, "etc/hosts".into()));
    }

    #[test]
    fn later_registration_wins_ties() {
        let preopens = [(3, "/a"), (4, "/a/")];
        assert_eq!(find(&preopens, "/a/x").unwrap().0, 4);
        let preopens = [(3, "/a"), (4, "/a")];
        assert_eq!(find(&preopens, "/a/x").unwrap().0, 4);
    }

    #[test]
    fn dot_preopens() {
        let preopens = [(3, "/"), (4, ".")];
        // Relative queries keep the dot and match "." literally.
        assert_eq!(find(&preopens, "./src/main.rs").unwrap(), (4, "src/main.rs".into()));
        assert_eq!(find(&preopens, ".").unwrap(), (4, ".".into()));
        // An empty prefix still needs a segment boundary after it.
        assert!(matches!(find(&preopens, "src"), Err(Error::NoPreopen(_))));
        assert!(find(&[(3, ".")], "src/main.rs").is_err());

        let preopens = [(3, "./tmp")];
        assert_eq!(find(&preopens, "tmp/x").unwrap(), (3, "x".into()));
        assert_eq!(find(&preopens, "./tmp/x").unwrap(), (3, "x".into()));
    }
}
