//! Data-only path templates.
//!
//! A [`PathTemplate`] records the route from a schema root to a subschema
//! as a sequence of steps, with wildcards standing in for array elements
//! and mapping values. Templates are plain data resolved against instance
//! values at extraction time, so they serialize and evaluate independently
//! of the schema walk that produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a path template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathStep {
    /// A fixed mapping key.
    Key(String),
    /// A fixed sequence index.
    Index(usize),
    /// Every element of a sequence.
    AnyIndex,
    /// Every value of a mapping.
    AnyKey,
}

/// A concrete step of a resolved [`Location`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationStep {
    Key(String),
    Index(usize),
}

/// A concrete position inside a JSON value: a template with all wildcards
/// replaced by the indices and keys they matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(Vec<LocationStep>);

impl Location {
    pub fn steps(&self) -> &[LocationStep] {
        &self.0
    }

    /// Render as a JSON Pointer (RFC 6901), `""` for the document root.
    pub fn pointer(&self) -> String {
        let mut out = String::new();
        for step in &self.0 {
            out.push('/');
            match step {
                LocationStep::Key(k) => {
                    out.push_str(&k.replace('~', "~0").replace('/', "~1"));
                }
                LocationStep::Index(i) => {
                    out.push_str(&i.to_string());
                }
            }
        }
        out
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.pointer())
    }
}

/// An ordered sequence of [`PathStep`]s, rooted at the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathTemplate(Vec<PathStep>);

impl PathTemplate {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    /// Return a new template with `step` appended.
    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    /// Resolve the template against a value, yielding every matching
    /// location together with the value found there.
    ///
    /// A fixed key on a non-mapping, a fixed index on a non-sequence, and
    /// a wildcard on the wrong shape all yield no locations (silent miss).
    /// Wildcards expand in encounter order, so the output is the stable
    /// product of expansions.
    pub fn resolve<'v>(&self, value: &'v Value) -> Vec<(Location, &'v Value)> {
        let mut out = Vec::new();
        resolve_steps(&self.0, value, &mut Vec::new(), &mut out);
        out
    }
}

impl core::fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for step in &self.0 {
            f.write_str("/")?;
            match step {
                PathStep::Key(k) => f.write_str(k)?,
                PathStep::Index(i) => write!(f, "{i}")?,
                PathStep::AnyIndex => f.write_str("[*]")?,
                PathStep::AnyKey => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

fn resolve_steps<'v>(
    steps: &[PathStep],
    value: &'v Value,
    prefix: &mut Vec<LocationStep>,
    out: &mut Vec<(Location, &'v Value)>,
) {
    let Some((step, rest)) = steps.split_first() else {
        out.push((Location(prefix.clone()), value));
        return;
    };

    match step {
        PathStep::Key(name) => {
            if let Some(child) = value.as_object().and_then(|m| m.get(name)) {
                prefix.push(LocationStep::Key(name.clone()));
                resolve_steps(rest, child, prefix, out);
                prefix.pop();
            }
        }
        PathStep::Index(i) => {
            if let Some(child) = value.as_array().and_then(|a| a.get(*i)) {
                prefix.push(LocationStep::Index(*i));
                resolve_steps(rest, child, prefix, out);
                prefix.pop();
            }
        }
        PathStep::AnyIndex => {
            if let Some(items) = value.as_array() {
                for (i, child) in items.iter().enumerate() {
                    prefix.push(LocationStep::Index(i));
                    resolve_steps(rest, child, prefix, out);
                    prefix.pop();
                }
            }
        }
        PathStep::AnyKey => {
            if let Some(map) = value.as_object() {
                for (k, child) in map {
                    prefix.push(LocationStep::Key(k.clone()));
                    resolve_steps(rest, child, prefix, out);
                    prefix.pop();
                }
            }
        }
    }
}
