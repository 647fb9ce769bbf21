/// Post documents (microformats2 JSON)
use crate::error::{InariError, InariResult};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A microformats2 document
///
/// Properties map a name to an ordered list of values. Both top-level posts
/// and nested values such as an `h-card` location share this shape. Keys
/// outside `type`, `properties` and `value` (`id`, `children`, ...) are kept
/// in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "type")]
    pub kind: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: BTreeMap<String, Vec<PropertyValue>>,
    /// Plain-text fallback carried by embedded documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `"properties": null` reads as no properties
fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<PropertyValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// One value of a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Bool(bool),
    Number(Number),
    Document(Post),
    /// Any other JSON object, e.g. `{"html": "..."}` content
    Object(Map<String, Value>),
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n)
            .map(PropertyValue::Number)
            .unwrap_or_else(|| PropertyValue::Text(n.to_string()))
    }
}

impl From<Post> for PropertyValue {
    fn from(doc: Post) -> Self {
        PropertyValue::Document(doc)
    }
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl Post {
    /// Create an empty document of the given type, e.g. `h-entry`
    pub fn new(kind: &str) -> Self {
        Self {
            kind: vec![kind.to_string()],
            properties: BTreeMap::new(),
            value: None,
            extra: Map::new(),
        }
    }

    /// Append a value to a property
    pub fn add_property(&mut self, key: &str, value: impl Into<PropertyValue>) {
        self.properties
            .entry(key.to_string())
            .or_default()
            .push(value.into());
    }

    /// Builder form of [`Post::add_property`]
    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.add_property(key, value);
        self
    }

    /// Replace every value of a property
    pub fn set_property(&mut self, key: &str, value: impl Into<PropertyValue>) {
        self.properties.insert(key.to_string(), vec![value.into()]);
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.get(key).is_some_and(|values| !values.is_empty())
    }

    /// First string value of a property
    pub fn first_string(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)?
            .iter()
            .find_map(PropertyValue::as_str)
    }

    /// Every string value of a property, in order
    pub fn strings(&self, key: &str) -> Vec<&str> {
        self.properties
            .get(key)
            .map(|values| values.iter().filter_map(PropertyValue::as_str).collect())
            .unwrap_or_default()
    }

    pub fn uid(&self) -> Option<&str> {
        self.first_string("uid")
    }

    pub fn url(&self) -> Option<&str> {
        self.first_string("url")
    }

    /// Parse the `published` property
    pub fn published(&self) -> InariResult<DateTime<FixedOffset>> {
        let raw = self
            .first_string("published")
            .ok_or_else(|| InariError::Validation("post has no published date".to_string()))?;

        DateTime::parse_from_rfc3339(raw)
            .map_err(|e| InariError::Validation(format!("invalid published date {:?}: {}", raw, e)))
    }

    /// Fill the fields every stored post must carry
    ///
    /// `uid` and `url` are always overwritten; `type`, `published` and
    /// `author` are only filled when missing.
    pub fn set_defaults(&mut self, author: &str, uid: &str, url: &str, now: DateTime<Utc>) {
        if self.kind.is_empty() {
            self.kind.push("h-entry".to_string());
        }
        if !self.has_property("published") {
            self.set_property("published", now.to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        if !self.has_property("author") {
            self.set_property("author", author);
        }
        self.set_property("uid", uid);
        self.set_property("url", url);
    }
}
