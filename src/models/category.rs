use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

const URN_PREFIX: &str = "urn:entity:";

/// Entity kind queried independently against the insights service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Artist,
    Book,
    Brand,
    Destination,
    Movie,
    Person,
    Place,
    Podcast,
    TvShow,
    Videogame,
}

impl Category {
    /// Every category, in default query order
    pub const ALL: [Category; 10] = [
        Category::Artist,
        Category::Book,
        Category::Brand,
        Category::Destination,
        Category::Movie,
        Category::Person,
        Category::Place,
        Category::Podcast,
        Category::TvShow,
        Category::Videogame,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Artist => "artist",
            Category::Book => "book",
            Category::Brand => "brand",
            Category::Destination => "destination",
            Category::Movie => "movie",
            Category::Person => "person",
            Category::Place => "place",
            Category::Podcast => "podcast",
            Category::TvShow => "tv_show",
            Category::Videogame => "videogame",
        }
    }

    /// Value sent as `filter.type`, e.g. `urn:entity:tv_show`
    pub fn urn(&self) -> String {
        format!("{}{}", URN_PREFIX, self.as_str())
    }

    /// Whether price-level filters from a profile apply to this category
    pub fn accepts_price_filter(&self) -> bool {
        matches!(
            self,
            Category::Place | Category::Destination | Category::Brand
        )
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Accepts both `movie` and `urn:entity:movie`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let short = s.trim().strip_prefix(URN_PREFIX).unwrap_or(s.trim());
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == short)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urn() {
        assert_eq!(Category::TvShow.urn(), "urn:entity:tv_show");
        assert_eq!(Category::Videogame.urn(), "urn:entity:videogame");
    }

    #[test]
    fn test_parse_short_and_urn_forms() {
        assert_eq!("movie".parse::<Category>(), Ok(Category::Movie));
        assert_eq!("urn:entity:place".parse::<Category>(), Ok(Category::Place));
        assert_eq!(" book ".parse::<Category>(), Ok(Category::Book));
        assert!("video_game".parse::<Category>().is_err());
    }

    #[test]
    fn test_serde_uses_short_name() {
        let json = serde_json::to_string(&Category::TvShow).unwrap();
        assert_eq!(json, "\"tv_show\"");

        let parsed: Category = serde_json::from_str("\"artist\"").unwrap();
        assert_eq!(parsed, Category::Artist);
    }

    #[test]
    fn test_price_filter_categories() {
        let accepting: Vec<Category> = Category::ALL
            .iter()
            .copied()
            .filter(Category::accepts_price_filter)
            .collect();
        assert_eq!(
            accepting,
            vec![Category::Brand, Category::Destination, Category::Place]
        );
    }
}
