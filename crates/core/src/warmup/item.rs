//! One unit of warm-up work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Unit separator; never produced by URL serialization.
const SEPARATOR: char = '\u{1F}';

/// A (URL, request variant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Item {
    url: String,
    variant: String,
}

impl Item {
    pub fn new(url: impl Into<String>, variant: impl Into<String>) -> Self {
        Self { url: url.into(), variant: variant.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() { write!(f, "{}", self.url) } else { write!(f, "{} [{}]", self.url, self.variant) }
    }
}

impl From<Item> for String {
    fn from(item: Item) -> Self {
        format!("{}{SEPARATOR}{}", item.url, item.variant)
    }
}

impl TryFrom<String> for Item {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.split_once(SEPARATOR) {
            Some((url, variant)) if !url.is_empty() => Ok(Item::new(url, variant)),
            _ => Err(Error::InvalidUrl(format!("malformed queue item: {raw:?}"))),
        }
    }
}
