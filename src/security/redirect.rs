// [library] WHATWG URL parser - absolute URIs only, relative references fail to parse
use url::Url;

use std::str::FromStr;
use tracing::debug;

// [security] How an allow-list entry's path constrains the candidate path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMatch {
    // Literal string prefix: "/app" also admits "/application"
    #[default]
    Prefix,
    // Prefix ending on a path-segment boundary: "/app" admits "/app" and "/app/..." only
    Segment,
}

impl FromStr for PathMatch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(PathMatch::Prefix),
            "segment" => Ok(PathMatch::Segment),
            other => Err(anyhow::anyhow!(
                "unknown redirect path match mode '{}' (expected 'prefix' or 'segment')",
                other
            )),
        }
    }
}

// [security] Parsed (scheme, host, port, path) view of a URI
#[derive(Debug, Clone, PartialEq, Eq)]
struct RedirectTarget {
    base: String, // scheme://host[:port], lowercased
    path: String,
}

impl RedirectTarget {
    // Anything without a host (mailto:, javascript:, data:) is not a redirect destination
    fn parse(uri: &str) -> Option<Self> {
        let url = Url::parse(uri.trim()).ok()?;
        let host = url.host_str()?;
        let base = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Some(Self {
            base: base.to_ascii_lowercase(),
            path: url.path().to_string(),
        })
    }
}

// [security] Static set of post-login destinations, loaded from configuration
#[derive(Debug, Clone)]
pub struct RedirectAllowList {
    entries: Vec<RedirectTarget>,
    path_match: PathMatch,
}

impl RedirectAllowList {
    // [security] Every configured entry must parse - a typo must not silently shrink the list
    pub fn new<S: AsRef<str>>(authorized_uris: &[S], path_match: PathMatch) -> anyhow::Result<Self> {
        let entries = authorized_uris
            .iter()
            .map(|uri| {
                RedirectTarget::parse(uri.as_ref()).ok_or_else(|| {
                    anyhow::anyhow!("authorized redirect URI '{}' is not an absolute URI", uri.as_ref())
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            entries,
            path_match,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // [security] True iff some entry has the same scheme+host+port and admits the candidate path
    // An unparseable candidate is never authorized
    pub fn is_authorized(&self, candidate: &str) -> bool {
        let Some(target) = RedirectTarget::parse(candidate) else {
            debug!("Redirect candidate is not an absolute URI");
            return false;
        };

        let authorized = self.entries.iter().any(|entry| {
            entry.base.eq_ignore_ascii_case(&target.base) && self.path_admits(&entry.path, &target.path)
        });

        if !authorized {
            debug!("Redirect candidate {} did not match any authorized entry", target.base);
        }
        authorized
    }

    fn path_admits(&self, authorized: &str, candidate: &str) -> bool {
        if authorized == "/" {
            return true;
        }
        match self.path_match {
            PathMatch::Prefix => candidate.starts_with(authorized),
            PathMatch::Segment => {
                candidate == authorized
                    || (authorized.ends_with('/') && candidate.starts_with(authorized))
                    || candidate
                        .strip_prefix(authorized)
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}
