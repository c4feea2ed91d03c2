//! Proxy chain allow-list.
//!
//! The allow-list is plain text: one allowed chain per line, one
//! whitespace-separated token per hop, most recent proxy first. A token
//! written as `/pattern/flags` is a regular expression searched for in the
//! hop; any other token is a case-insensitive prefix of the hop.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::{CasError, Result};

/// Proxies the server reports for a ticket, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProxyChain(Vec<String>);

impl ProxyChain {
    pub fn new(hops: Vec<String>) -> Self {
        Self(hops)
    }

    pub fn hops(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ProxyChain {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug)]
enum HopMatcher {
    Prefix(String),
    Pattern(Regex),
}

impl HopMatcher {
    fn parse(token: &str) -> Result<Self> {
        if let Some((pattern, flags)) = split_regex_token(token) {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(flags.contains('i'))
                .multi_line(flags.contains('m'))
                .dot_matches_new_line(flags.contains('s'))
                .ignore_whitespace(flags.contains('x'))
                .build()
                .map_err(|e| CasError::Configuration(format!("invalid proxy chain pattern {token:?}: {e}")))?;
            return Ok(HopMatcher::Pattern(regex));
        }
        Ok(HopMatcher::Prefix(token.to_owned()))
    }

    fn matches(&self, hop: &str) -> bool {
        match self {
            HopMatcher::Prefix(prefix) => hop
                .as_bytes()
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes())),
            HopMatcher::Pattern(regex) => regex.is_match(hop),
        }
    }
}

/// `/pattern/flags` -> `(pattern, flags)`. A token that opens with `/` but
/// has no unescaped closing delimiter is taken as a pattern in full.
fn split_regex_token(token: &str) -> Option<(&str, &str)> {
    let rest = token.strip_prefix('/')?;
    match last_unescaped_slash(rest) {
        Some(end) if rest[end + 1..].chars().all(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'u')) => {
            Some((&rest[..end], &rest[end + 1..]))
        }
        _ => Some((rest, "")),
    }
}

fn last_unescaped_slash(pattern: &str) -> Option<usize> {
    let mut last = None;
    let mut escaped = false;
    for (i, byte) in pattern.bytes().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'/' => last = Some(i),
            _ => {}
        }
    }
    last
}

#[derive(Debug, Default)]
pub struct AllowedChains(Vec<Vec<HopMatcher>>);

impl AllowedChains {
    pub fn parse(text: &str) -> Result<Self> {
        let chains = text
            .lines()
            .map(|line| line.split_whitespace().map(HopMatcher::parse).collect::<Result<Vec<_>>>())
            .filter(|chain| !matches!(chain, Ok(hops) if hops.is_empty()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(chains))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when some allowed chain has the same length as `chain` and every
    /// token matches the hop at its position.
    pub fn permits(&self, chain: &ProxyChain) -> bool {
        self.0.iter().any(|allowed| {
            allowed.len() == chain.len()
                && allowed.iter().zip(chain.hops()).all(|(matcher, hop)| matcher.matches(hop))
        })
    }

    pub fn verify(&self, chain: &ProxyChain) -> Result<()> {
        if self.permits(chain) {
            Ok(())
        } else {
            Err(CasError::ProxyChainRejected)
        }
    }
}

/// Parses `allow_list` and checks `chain` against it.
pub fn verify_proxy_chain(chain: &ProxyChain, allow_list: &str) -> Result<()> {
    AllowedChains::parse(allow_list)?.verify(chain)
}
