use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Movie categories. The set is closed: the data layer rejects anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Family,
    Fantasy,
    History,
    Horror,
    Music,
    Mystery,
    Romance,
    ScienceFiction,
    Thriller,
    War,
    Western,
}

/// Stored values are capped at this many characters.
pub const GENRE_MAX_LENGTH: usize = 13;

impl Genre {
    pub const ALL: [Genre; 18] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Family,
        Genre::Fantasy,
        Genre::History,
        Genre::Horror,
        Genre::Music,
        Genre::Mystery,
        Genre::Romance,
        Genre::ScienceFiction,
        Genre::Thriller,
        Genre::War,
        Genre::Western,
    ];

    /// The value written to the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Family => "Family",
            Genre::Fantasy => "Fantasy",
            Genre::History => "History",
            Genre::Horror => "Horror",
            Genre::Music => "Music",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::ScienceFiction => "Science Ficti",
            Genre::Thriller => "Thriller",
            Genre::War => "War",
            Genre::Western => "Western",
        }
    }

    /// Human readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Genre::ScienceFiction => "Science Fiction",
            other => other.as_str(),
        }
    }

    /// Accepts either the stored value or the label.
    pub fn parse(s: &str) -> Option<Genre> {
        let s = s.trim();
        Genre::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == s || g.label() == s)
    }

    /// Comma separated list of quoted stored values, for SQL `IN (...)` clauses.
    pub fn sql_choices() -> String {
        Genre::ALL
            .iter()
            .map(|g| format!("'{}'", g.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown genre: {0}")]
pub struct UnknownGenre(pub String);

impl FromStr for Genre {
    type Err = UnknownGenre;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Genre::parse(s).ok_or_else(|| UnknownGenre(s.to_string()))
    }
}

impl Serialize for Genre {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Genre {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Genre::parse(&s).ok_or_else(|| serde::de::Error::custom(UnknownGenre(s)))
    }
}

/// Encode an ordered genre sequence the way it is stored in a column.
pub fn encode_genres(genres: &[Genre]) -> String {
    serde_json::to_string(genres).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored genre column, rejecting values outside the set.
pub fn decode_genres(raw: &str) -> Result<Vec<Genre>, UnknownGenre> {
    let values: Vec<String> =
        serde_json::from_str(raw).map_err(|_| UnknownGenre(raw.to_string()))?;
    values.iter().map(|v| v.parse()).collect()
}
