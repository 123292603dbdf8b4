//! Addressable paths into content item bodies
//!
//! A [`BodyPath`] is a list of [`PathStep`]s resolved against an owned
//! `serde_json::Value`. Paths locate dependency edges for in-place rewriting and
//! address the fields written by translations.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Tokens of a translation key path: `[0]`, `['key']`, `["key"]` or `.key`
static PATH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"\[(\d+)\]|\['((?:[^'\\]|\\.)*)'\]|\["((?:[^"\\]|\\.)*)"\]|\.?([^.\[\]]+)"#)
        .unwrap()
});

/// Most `null` elements written to reach an index past the end of an array
pub const MAX_INDEX_GAP: usize = 256;

/// One step of a [`BodyPath`]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Object member
    Key(String),
    /// Array element
    Index(usize),
}

/// Location of a value inside a body
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BodyPath(Vec<PathStep>);

impl BodyPath {
    /// The empty path, addressing the body itself
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from steps
    pub fn from_steps(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }

    /// Build a path of object keys
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(|k| PathStep::Key(k.into())).collect())
    }

    /// Steps of this path
    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a step in place
    pub fn push(&mut self, step: PathStep) {
        self.0.push(step);
    }

    /// Remove the last step in place
    pub fn pop(&mut self) -> Option<PathStep> {
        self.0.pop()
    }

    /// A new path extended by an object key
    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(PathStep::Key(key.into()));
        path
    }

    /// Parse a translation key such as `title`, `items[0].text`, `items.0.text`
    /// or `$['my field']`
    ///
    /// Bracketed numbers and purely numeric dotted segments become array indices;
    /// everything else is an object key. A leading `$` is ignored.
    pub fn parse(key: &str) -> Result<Self> {
        let trimmed = key.trim();
        let rest = trimmed.strip_prefix('$').unwrap_or(trimmed);
        if rest.is_empty() {
            return Err(Error::InvalidPath(format!("empty path '{key}'")));
        }

        let mut steps = Vec::new();
        let mut consumed = 0;
        for caps in PATH_TOKEN.captures_iter(rest) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() != consumed {
                return Err(Error::InvalidPath(format!(
                    "unexpected characters at offset {consumed} in '{key}'"
                )));
            }
            consumed = whole.end();

            let step = if let Some(index) = caps.get(1) {
                PathStep::Index(parse_index(index.as_str(), key)?)
            } else if let Some(quoted) = caps.get(2).or_else(|| caps.get(3)) {
                PathStep::Key(unescape(quoted.as_str()))
            } else if let Some(segment) = caps.get(4) {
                let segment = segment.as_str();
                if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                    PathStep::Index(parse_index(segment, key)?)
                } else {
                    PathStep::Key(segment.to_string())
                }
            } else {
                continue;
            };
            steps.push(step);
        }

        if consumed != rest.len() || steps.is_empty() {
            return Err(Error::InvalidPath(format!("could not parse '{key}'")));
        }
        Ok(Self(steps))
    }

    /// Resolve against a body
    pub fn get<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(body, |current, step| match step {
            PathStep::Key(key) => current.as_object()?.get(key),
            PathStep::Index(index) => current.as_array()?.get(*index),
        })
    }

    /// Resolve mutably against a body
    pub fn get_mut<'a>(&self, body: &'a mut Value) -> Option<&'a mut Value> {
        self.0.iter().try_fold(body, |current, step| match step {
            PathStep::Key(key) => current.as_object_mut()?.get_mut(key),
            PathStep::Index(index) => current.as_array_mut()?.get_mut(*index),
        })
    }

    /// Write `value` at this path, creating missing intermediate containers
    ///
    /// A missing (or `null`) container becomes an array when the step that
    /// addresses into it is an index, otherwise an object. Arrays shorter than an
    /// addressed index are padded with `null`, up to [`MAX_INDEX_GAP`] elements.
    pub fn set(&self, body: &mut Value, value: Value) -> Result<()> {
        let Some((last, parents)) = self.0.split_last() else {
            *body = value;
            return Ok(());
        };

        let mut current = body;
        for (position, step) in parents.iter().enumerate() {
            let next = &self.0[position + 1];
            current = self.step_into(current, step, matches!(next, PathStep::Index(_)))?;
        }

        match last {
            PathStep::Key(key) => {
                self.object_at(current)?.insert(key.clone(), value);
            }
            PathStep::Index(index) => {
                let array = self.array_at(current)?;
                *self.element_at(array, *index)? = value;
            }
        }
        Ok(())
    }

    /// Remove the value at this path
    ///
    /// Object members are deleted; array elements are replaced by `null` so that
    /// paths to later elements stay valid. Returns the removed value.
    pub fn remove(&self, body: &mut Value) -> Option<Value> {
        let (last, parents) = self.0.split_last()?;
        let parent = BodyPath(parents.to_vec()).get_mut(body)?;
        match last {
            PathStep::Key(key) => parent.as_object_mut()?.remove(key),
            PathStep::Index(index) => {
                let slot = parent.as_array_mut()?.get_mut(*index)?;
                Some(std::mem::replace(slot, Value::Null))
            }
        }
    }

    fn step_into<'a>(
        &self,
        current: &'a mut Value,
        step: &PathStep,
        next_is_index: bool,
    ) -> Result<&'a mut Value> {
        let slot = match step {
            PathStep::Key(key) => self
                .object_at(current)?
                .entry(key.clone())
                .or_insert(Value::Null),
            PathStep::Index(index) => {
                let array = self.array_at(current)?;
                self.element_at(array, *index)?
            }
        };
        if slot.is_null() {
            *slot = if next_is_index {
                Value::Array(Vec::new())
            } else {
                Value::Object(Map::new())
            };
        }
        Ok(slot)
    }

    /// Element `index` of `array`, padding with `null` up to it
    fn element_at<'a>(&self, array: &'a mut Vec<Value>, index: usize) -> Result<&'a mut Value> {
        if index >= array.len() {
            if index - array.len() > MAX_INDEX_GAP {
                return Err(Error::InvalidPath(format!(
                    "'{self}' index {index} is too far past the end of an array of {}",
                    array.len()
                )));
            }
            array.resize(index + 1, Value::Null);
        }
        Ok(&mut array[index])
    }

    fn object_at<'a>(&self, value: &'a mut Value) -> Result<&'a mut Map<String, Value>> {
        if value.is_null() {
            *value = Value::Object(Map::new());
        }
        value
            .as_object_mut()
            .ok_or_else(|| Error::InvalidPath(format!("'{self}' crosses a non-object value")))
    }

    fn array_at<'a>(&self, value: &'a mut Value) -> Result<&'a mut Vec<Value>> {
        if value.is_null() {
            *value = Value::Array(Vec::new());
        }
        value
            .as_array_mut()
            .ok_or_else(|| Error::InvalidPath(format!("'{self}' indexes a non-array value")))
    }
}

impl std::fmt::Display for BodyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("$")?;
        for step in &self.0 {
            match step {
                PathStep::Key(key) => write!(f, ".{key}")?,
                PathStep::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

fn parse_index(digits: &str, key: &str) -> Result<usize> {
    digits
        .parse()
        .map_err(|_| Error::InvalidPath(format!("index '{digits}' out of range in '{key}'")))
}

fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}
