//! Backend capabilities.
//!
//! A backend declares the set of capabilities it supports; the registry only
//! routes a request to a backend whose declared set covers what the request
//! needs.

use serde::{Deserialize, Serialize};

/// A single generation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Face image + waveform (or text the backend voices itself) in,
    /// synchronized talking-head video out.
    LipSync,
    /// Text prompt (+ optional reference image) in, video out. No guaranteed
    /// voice track.
    TextToVideo,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::LipSync => "lip_sync",
            Capability::TextToVideo => "text_to_video",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A small set of capabilities declared by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(Vec<Capability>);

impl CapabilitySet {
    pub fn new(caps: impl IntoIterator<Item = Capability>) -> Self {
        let mut v: Vec<Capability> = Vec::new();
        for c in caps {
            if !v.contains(&c) {
                v.push(c);
            }
        }
        Self(v)
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    /// True if every capability in `required` is declared here.
    pub fn is_superset(&self, required: &CapabilitySet) -> bool {
        required.iter().all(|c| self.contains(c))
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Capability> for CapabilitySet {
    fn from(cap: Capability) -> Self {
        Self(vec![cap])
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.as_str()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
