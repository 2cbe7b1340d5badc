//! # Cache Key Generator
//!
//! Cache keys are derived from the HTTP verb, the logical path and a canonical
//! serialization of the query parameters. Parameters are sorted before they
//! are serialized, so `{a:1,b:2}` and `{b:2,a:1}` produce the same key.
//!
//! Layout: `<prefix><VERB>:<path>[?<k1>=<v1>&<k2>=<v2>...]`. Keys longer than
//! the configured maximum are shortened to a SHA-256 digest of the full text.

use reqwest::Method;
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::fmt;

/// What kind of origin resource a key addresses
///
/// The class decides which TTL an entry gets and which entries a mutation
/// sweeps away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    /// A single document, addressed by id
    Document,
    /// A listing or search result page
    Listing,
}

/// A fully derived cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    class: KeyClass,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn class(&self) -> KeyClass {
        self.class
    }

    pub fn is_listing(&self) -> bool {
        self.class == KeyClass::Listing
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

/// Derives [`CacheKey`]s with a shared prefix and length limit
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
    max_length: usize,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new("docproxy:", 250)
    }
}

impl KeyBuilder {
    pub fn new<S: Into<String>>(prefix: S, max_length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            max_length,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the key for a request
    pub fn build<I, K, V>(&self, method: &Method, path: &str, query: I, class: KeyClass) -> CacheKey
    where
        I: IntoIterator<Item = (K, V)>,
        K: Borrow<str>,
        V: Borrow<str>,
    {
        let mut key = format!("{}{}:{}", self.prefix, method.as_str(), path);

        let canonical = canonical_query(query);
        if !canonical.is_empty() {
            key.push('?');
            key.push_str(&canonical);
        }

        CacheKey {
            text: self.truncate_key(key),
            class,
        }
    }

    /// Key under which a single document is cached
    pub fn document(&self, path: &str) -> CacheKey {
        self.build(&Method::GET, path, std::iter::empty::<(&str, &str)>(), KeyClass::Document)
    }

    /// Hash the key if it exceeds the max length so it stays bounded and deterministic
    fn truncate_key(&self, key: String) -> String {
        if key.len() <= self.max_length {
            key
        } else {
            let mut hasher = Sha256::new();
            hasher.update(key.as_bytes());
            format!("{}sha256:{}", self.prefix, hex::encode(hasher.finalize()))
        }
    }
}

/// Sorted, percent-encoded `k=v` pairs joined by `&`
pub fn canonical_query<I, K, V>(query: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Borrow<str>,
    V: Borrow<str>,
{
    let mut pairs: Vec<(String, String)> = query
        .into_iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k.borrow()).into_owned(),
                urlencoding::encode(v.borrow()).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
