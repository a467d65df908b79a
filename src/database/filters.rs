use crate::{
    error::Error,
    form::ValidationErrors,
    pagination::lookup,
    schema::{Membership, Uuid},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Uuid>,
    /// Tag slugs, a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub is_favorited: Option<bool>,
    pub is_in_shopping_cart: Option<bool>,
}

impl RecipeFilter {
    pub fn from_query(query: &[(String, String)]) -> Result<Self, Error> {
        let mut errors = ValidationErrors::default();

        let author = lookup(query, "author").and_then(|value| {
            value
                .trim()
                .parse::<Uuid>()
                .map_err(|_| errors.add("author", "Enter a whole number."))
                .ok()
        });

        let mut flag = |key: &str| {
            lookup(query, key).and_then(|value| {
                let flag = parse_flag(value);
                if flag.is_none() {
                    errors.add(key, "Enter one of 1, 0, true, false.");
                }
                flag
            })
        };

        let is_favorited = flag("is_favorited");
        let is_in_shopping_cart = flag("is_in_shopping_cart");

        errors.into_result()?;

        let tags = query
            .iter()
            .filter(|(k, v)| k == "tags" && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
            .collect();

        Ok(Self {
            author,
            tags,
            is_favorited,
            is_in_shopping_cart,
        })
    }

    pub fn membership(&self, membership: Membership) -> Option<bool> {
        match membership {
            Membership::Favorites => self.is_favorited,
            Membership::ShoppingCart => self.is_in_shopping_cart,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Case-insensitive prefix for the ingredient search, `None` lists everything.
pub fn ingredient_prefix(query: &[(String, String)]) -> Option<String> {
    lookup(query, "name")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// How many recipes to show per followed author.
pub fn recipes_limit(query: &[(String, String)]) -> Result<Option<i64>, Error> {
    let Some(value) = lookup(query, "recipes_limit") else {
        return Ok(None);
    };

    match value.trim().parse::<i64>() {
        Ok(limit) if limit >= 0 => Ok(Some(limit)),
        _ => {
            let mut errors = ValidationErrors::default();
            errors.add("recipes_limit", "Ensure this value is a positive integer.");
            errors.into_result().map(|_| None)
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::error::HttpError;

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_queries_do_not_filter() {
        assert_eq!(RecipeFilter::from_query(&[]).unwrap(), RecipeFilter::default());
    }

    #[test]
    fn tags_collect_every_value() {
        let filter =
            RecipeFilter::from_query(&query(&[("tags", "breakfast"), ("tags", "lunch"), ("tags", "")]))
                .unwrap();

        assert_eq!(filter.tags, vec!["breakfast", "lunch"]);
    }

    #[rstest]
    #[case("1", true)]
    #[case("true", true)]
    #[case("True", true)]
    #[case("0", false)]
    #[case("false", false)]
    fn flags_accept_numbers_and_words(#[case] value: &str, #[case] expected: bool) {
        let filter = RecipeFilter::from_query(&query(&[
            ("is_favorited", value),
            ("is_in_shopping_cart", value),
        ]))
        .unwrap();

        assert_eq!(filter.membership(Membership::Favorites), Some(expected));
        assert_eq!(filter.membership(Membership::ShoppingCart), Some(expected));
    }

    #[test]
    fn invalid_values_are_reported_per_parameter() {
        let error =
            RecipeFilter::from_query(&query(&[("author", "me"), ("is_favorited", "yes")]))
                .unwrap_err();

        assert_eq!(error.kind, HttpError::InvalidRequest);
        assert_eq!(
            error.details,
            Some(json!({
                "author": ["Enter a whole number."],
                "is_favorited": ["Enter one of 1, 0, true, false."]
            }))
        );
    }

    #[test]
    fn author_is_an_exact_id() {
        let filter = RecipeFilter::from_query(&query(&[("author", "7")])).unwrap();

        assert_eq!(filter.author, Some(7));
    }

    #[rstest]
    #[case(&[], None)]
    #[case(&[("name", "  ")], None)]
    #[case(&[("name", " мол ")], Some("мол"))]
    fn ingredient_prefix_is_trimmed(#[case] pairs: &[(&str, &str)], #[case] expected: Option<&str>) {
        assert_eq!(ingredient_prefix(&query(pairs)).as_deref(), expected);
    }

    #[test]
    fn recipes_limit_must_be_a_positive_integer() {
        assert_eq!(recipes_limit(&query(&[("recipes_limit", "3")])).unwrap(), Some(3));
        assert_eq!(recipes_limit(&[]).unwrap(), None);
        assert!(recipes_limit(&query(&[("recipes_limit", "-1")])).is_err());
        assert!(recipes_limit(&query(&[("recipes_limit", "many")])).is_err());
    }
}
