use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::{VerdantError, VerdantResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortTerm {
    pub attribute: String,
    pub direction: SortDirection,
}

impl SortTerm {
    /// Parses `"attr"`, `"attr ASC"` or `"attr DESC"` (direction is
    /// case-insensitive).
    pub fn parse(raw: &str) -> VerdantResult<Self> {
        let mut parts = raw.split_whitespace();
        let attribute = parts
            .next()
            .ok_or_else(|| VerdantError::invalid("empty sort term"))?
            .to_string();
        let direction = match parts.next() {
            None => SortDirection::Asc,
            Some(word) if word.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            Some(word) if word.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            Some(word) => {
                return Err(VerdantError::invalid(format!(
                    "unrecognized sort direction: {word}"
                )));
            }
        };
        if parts.next().is_some() {
            return Err(VerdantError::invalid(format!("malformed sort term: {raw}")));
        }
        Ok(Self {
            attribute,
            direction,
        })
    }
}

/// Caller-facing request shape for find/update/delete.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Criteria {
    #[serde(default)]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_sort")]
    pub sort: Vec<SortTerm>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

fn deserialize_sort<'de, D>(deserializer: D) -> Result<Vec<SortTerm>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawSort {
        One(String),
        Many(Vec<String>),
    }

    let raw = Option::<RawSort>::deserialize(deserializer)?;
    let terms = match raw {
        None => Vec::new(),
        Some(RawSort::One(term)) => vec![term],
        Some(RawSort::Many(terms)) => terms,
    };
    terms
        .iter()
        .map(|term| SortTerm::parse(term))
        .collect::<VerdantResult<Vec<_>>>()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_term_parsing() {
        let term = SortTerm::parse("generationName").unwrap();
        assert_eq!(term.direction, SortDirection::Asc);
        let term = SortTerm::parse("plantName DESC").unwrap();
        assert_eq!(term.direction, SortDirection::Desc);
        let term = SortTerm::parse("plantName asc").unwrap();
        assert_eq!(term.direction, SortDirection::Asc);
        assert!(SortTerm::parse("plantName sideways").is_err());
        assert!(SortTerm::parse("plantName DESC extra").is_err());
    }

    #[test]
    fn criteria_deserializes_scalar_and_list_sort() {
        let criteria: Criteria =
            serde_json::from_value(serde_json::json!({"sort": "plantName DESC"})).unwrap();
        assert_eq!(criteria.sort.len(), 1);
        let criteria: Criteria = serde_json::from_value(
            serde_json::json!({"sort": ["plantName DESC", "plantId"], "limit": 5}),
        )
        .unwrap();
        assert_eq!(criteria.sort.len(), 2);
        assert_eq!(criteria.limit, Some(5));
    }
}
