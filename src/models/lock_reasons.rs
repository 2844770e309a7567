use serde::{Deserialize, Serialize};

/// Lock reasons as stored in a requisition's free-text `observations` field.
///
/// The backend stores a JSON list of strings there. Anything else is kept as a
/// single opaque reason rather than dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LockReasons {
    Structured(Vec<String>),
    Opaque(String),
}

impl Default for LockReasons {
    fn default() -> Self {
        LockReasons::Structured(Vec::new())
    }
}

impl LockReasons {
    /// Parses the `observations` field. Missing or blank input yields no reasons.
    pub fn parse(observations: Option<&str>) -> Self {
        let raw = match observations.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return LockReasons::default(),
        };

        match serde_json::from_str::<Vec<String>>(raw) {
            Ok(list) => LockReasons::Structured(list),
            Err(_) => LockReasons::Opaque(raw.to_string()),
        }
    }

    /// Serializes a reason list for the `observations` field.
    pub fn to_observations(reasons: &[String]) -> String {
        // A Vec<String> always serializes.
        serde_json::to_string(reasons).unwrap_or_default()
    }

    pub fn as_list(&self) -> Vec<&str> {
        match self {
            LockReasons::Structured(list) => list.iter().map(String::as_str).collect(),
            LockReasons::Opaque(raw) => vec![raw.as_str()],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LockReasons::Structured(list) => list.is_empty(),
            LockReasons::Opaque(raw) => raw.is_empty(),
        }
    }
}
