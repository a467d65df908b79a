use std::collections::HashMap;

use serde::Serialize;

use crate::{
    media::image_url,
    schema::{RecipeDetails, RecipePart, RecipeShort, SubscriptionRow, Tag, User, UserRow, Uuid},
};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserSerializer {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl From<UserRow> for UserSerializer {
    fn from(value: UserRow) -> Self {
        Self {
            email: value.email,
            id: value.id,
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
            is_subscribed: value.is_subscribed,
        }
    }
}

/// Freshly registered user, no subscription state yet.
#[derive(Serialize, Debug)]
pub struct RegisteredUserSerializer {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for RegisteredUserSerializer {
    fn from(value: User) -> Self {
        Self {
            email: value.email,
            id: value.id,
            username: value.username,
            first_name: value.first_name,
            last_name: value.last_name,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct TokenSerializer {
    pub auth_token: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeIngredientSerializer {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipePart> for RecipeIngredientSerializer {
    fn from(value: RecipePart) -> Self {
        Self {
            id: value.ingredient_id,
            name: value.name,
            measurement_unit: value.measurement_unit,
            amount: value.amount,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct RecipeSerializer {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: UserSerializer,
    pub ingredients: Vec<RecipeIngredientSerializer>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

impl RecipeSerializer {
    pub fn new(details: RecipeDetails, media_url: &str) -> Self {
        let RecipeDetails {
            row,
            ingredients,
            tags,
        } = details;

        Self {
            id: row.id,
            tags,
            author: UserSerializer {
                email: row.author_email,
                id: row.author_id,
                username: row.author_username,
                first_name: row.author_first_name,
                last_name: row.author_last_name,
                is_subscribed: row.author_is_subscribed,
            },
            ingredients: ingredients.into_iter().map(Into::into).collect(),
            is_favorited: row.is_favorited,
            is_in_shopping_cart: row.is_in_shopping_cart,
            name: row.name,
            image: image_url(media_url, &row.image),
            text: row.text,
            cooking_time: row.cooking_time,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RecipeShortSerializer {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShortSerializer {
    pub fn new(recipe: RecipeShort, media_url: &str) -> Self {
        Self {
            id: recipe.id,
            image: image_url(media_url, &recipe.image),
            name: recipe.name,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct SubscriptionSerializer {
    pub email: String,
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub recipes: Vec<RecipeShortSerializer>,
    pub recipes_count: i64,
}

impl SubscriptionSerializer {
    /// Short recipes keyed by their author.
    pub fn recipes_by_author(
        recipes: Vec<RecipeShort>,
        media_url: &str,
    ) -> HashMap<Uuid, Vec<RecipeShortSerializer>> {
        let mut by_author: HashMap<Uuid, Vec<RecipeShortSerializer>> = HashMap::new();
        for recipe in recipes {
            by_author
                .entry(recipe.author_id)
                .or_default()
                .push(RecipeShortSerializer::new(recipe, media_url));
        }
        by_author
    }

    /// Takes the author's own recipes out of `by_author`.
    pub fn new(
        author: SubscriptionRow,
        by_author: &mut HashMap<Uuid, Vec<RecipeShortSerializer>>,
    ) -> Self {
        Self {
            recipes: by_author.remove(&author.id).unwrap_or_default(),
            email: author.email,
            id: author.id,
            username: author.username,
            first_name: author.first_name,
            last_name: author.last_name,
            // Only ever listed for the follower
            is_subscribed: true,
            recipes_count: author.recipes_count,
        }
    }
}
