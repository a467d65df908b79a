use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use serde_json::json;

use crate::{
    constants::{
        AMOUNT_MAX, AMOUNT_MIN, COOKING_TIME_MAX, COOKING_TIME_MIN, EMAIL_MAX_LENGTH,
        PASSWORD_MIN_LENGTH, RECIPE_NAME_MAX_LENGTH, USER_NAME_MAX_LENGTH,
    },
    error::{Error, HttpError},
    media::ImagePayload,
    schema::Uuid,
};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const NOT_AN_INTEGER: &str = "A valid integer is required.";

/// Field level messages collected over a whole payload.
#[derive(Debug, Default)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn into_result(self) -> Result<(), Error> {
        if self.fields.is_empty() {
            return Ok(());
        }

        Err(HttpError::InvalidRequest
            .new("Invalid payload")
            .with_details(json!(self.fields)))
    }
}

/// Integers arrive either as JSON numbers or as numeric strings.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum IntegerField {
    Number(i64),
    Text(String),
}

impl IntegerField {
    fn value(&self) -> Option<i64> {
        match self {
            IntegerField::Number(n) => Some(*n),
            IntegerField::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn check_range(
    errors: &mut ValidationErrors,
    field: &str,
    value: &IntegerField,
    min: i32,
    max: i32,
) -> Option<i32> {
    let Some(value) = value.value() else {
        errors.add(field, NOT_AN_INTEGER);
        return None;
    };

    match i32::try_from(value) {
        Ok(value) if (min..=max).contains(&value) => Some(value),
        _ => {
            errors.add(
                field,
                format!("Ensure this value is between {min} and {max}."),
            );
            None
        }
    }
}

fn check_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: &str,
    max_length: Option<usize>,
) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }

    if let Some(max_length) = max_length {
        if value.chars().count() > max_length {
            errors.add(
                field,
                format!("Ensure this field has no more than {max_length} characters."),
            );
            return None;
        }
    }

    Some(value.to_string())
}

// Recipes

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IngredientAmountPayload {
    pub id: Uuid,
    pub amount: IntegerField,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RecipePayload {
    pub ingredients: Option<Vec<IngredientAmountPayload>>,
    pub tags: Option<Vec<Uuid>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<IntegerField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: i32,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub image: ImagePayload,
    pub text: String,
    pub cooking_time: i32,
    pub ingredients: Vec<IngredientAmount>,
    pub tags: Vec<Uuid>,
}

/// Validated PATCH payload; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub name: Option<String>,
    pub image: Option<ImagePayload>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub tags: Option<Vec<Uuid>>,
}

impl RecipeChanges {
    pub fn ingredient_ids(&self) -> Vec<Uuid> {
        self.ingredients
            .iter()
            .flatten()
            .map(|ingredient| ingredient.id)
            .collect()
    }
}

impl NewRecipe {
    pub fn ingredient_ids(&self) -> Vec<Uuid> {
        self.ingredients.iter().map(|ingredient| ingredient.id).collect()
    }
}

fn check_ingredients(
    errors: &mut ValidationErrors,
    ingredients: &[IngredientAmountPayload],
) -> Option<Vec<IngredientAmount>> {
    if ingredients.is_empty() {
        errors.add("ingredients", "Recipe needs at least one ingredient.");
        return None;
    }

    let mut seen = HashSet::new();
    let mut checked = Vec::with_capacity(ingredients.len());

    for ingredient in ingredients {
        if !seen.insert(ingredient.id) {
            errors.add(
                "ingredients",
                format!("Ingredient {} is listed more than once.", ingredient.id),
            );
            continue;
        }

        if let Some(amount) =
            check_range(errors, "ingredients", &ingredient.amount, AMOUNT_MIN, AMOUNT_MAX)
        {
            checked.push(IngredientAmount {
                id: ingredient.id,
                amount,
            });
        }
    }

    (checked.len() == ingredients.len()).then_some(checked)
}

fn check_tags(errors: &mut ValidationErrors, tags: &[Uuid]) -> Option<Vec<Uuid>> {
    if tags.is_empty() {
        errors.add("tags", "Recipe needs at least one tag.");
        return None;
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = tags.iter().find(|tag| !seen.insert(**tag)) {
        errors.add("tags", format!("Tag {duplicate} is listed more than once."));
        return None;
    }

    Some(tags.to_vec())
}

fn check_recipe(payload: RecipePayload, partial: bool, errors: &mut ValidationErrors) -> RecipeChanges {
    let required = |errors: &mut ValidationErrors, field: &str, present: bool| {
        if !present && !partial {
            errors.add(field, REQUIRED);
        }
    };

    required(errors, "ingredients", payload.ingredients.is_some());
    required(errors, "tags", payload.tags.is_some());
    required(errors, "image", payload.image.is_some());
    required(errors, "name", payload.name.is_some());
    required(errors, "text", payload.text.is_some());
    required(errors, "cooking_time", payload.cooking_time.is_some());

    RecipeChanges {
        ingredients: payload
            .ingredients
            .as_deref()
            .and_then(|ingredients| check_ingredients(errors, ingredients)),
        tags: payload.tags.as_deref().and_then(|tags| check_tags(errors, tags)),
        image: payload.image.as_deref().and_then(|image| {
            ImagePayload::try_from(image)
                .map_err(|message| errors.add("image", message))
                .ok()
        }),
        name: payload
            .name
            .as_deref()
            .and_then(|name| check_text(errors, "name", name, Some(RECIPE_NAME_MAX_LENGTH))),
        text: payload
            .text
            .as_deref()
            .and_then(|text| check_text(errors, "text", text, None)),
        cooking_time: payload.cooking_time.as_ref().and_then(|cooking_time| {
            check_range(
                errors,
                "cooking_time",
                cooking_time,
                COOKING_TIME_MIN,
                COOKING_TIME_MAX,
            )
        }),
    }
}

pub fn validate_new_recipe(payload: RecipePayload) -> Result<NewRecipe, Error> {
    let mut errors = ValidationErrors::default();
    let changes = check_recipe(payload, false, &mut errors);
    errors.into_result()?;

    match changes {
        RecipeChanges {
            name: Some(name),
            image: Some(image),
            text: Some(text),
            cooking_time: Some(cooking_time),
            ingredients: Some(ingredients),
            tags: Some(tags),
        } => Ok(NewRecipe {
            name,
            image,
            text,
            cooking_time,
            ingredients,
            tags,
        }),
        _ => Err(HttpError::InvalidRequest.new("Incomplete recipe")),
    }
}

pub fn validate_recipe_changes(payload: RecipePayload) -> Result<RecipeChanges, Error> {
    let mut errors = ValidationErrors::default();
    let changes = check_recipe(payload, true, &mut errors);
    errors.into_result()?;

    Ok(changes)
}

// Users

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RegisterPayload {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProfilePayload {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SetPasswordPayload {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginPayload {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Domains are case-insensitive, the local part is kept as written.
fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.trim().to_string(),
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) -> Option<String> {
    let email = check_text(errors, "email", email, Some(EMAIL_MAX_LENGTH))?;

    match email.rsplit_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Some(normalize_email(&email))
        }
        _ => {
            errors.add("email", "Enter a valid email address.");
            None
        }
    }
}

fn check_username(errors: &mut ValidationErrors, username: &str) -> Option<String> {
    let username = check_text(errors, "username", username, Some(USER_NAME_MAX_LENGTH))?;

    if username
        .chars()
        .all(|c| c.is_alphanumeric() || "_.@+-".contains(c))
    {
        Some(username)
    } else {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
        None
    }
}

fn check_password(errors: &mut ValidationErrors, field: &str, password: &str) -> Option<String> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.add(
            field,
            format!("This password is too short. It must contain at least {PASSWORD_MIN_LENGTH} characters."),
        );
        return None;
    }

    Some(password.to_string())
}

fn check_profile(payload: ProfilePayload, partial: bool, errors: &mut ValidationErrors) -> ProfileChanges {
    for (field, present) in [
        ("email", payload.email.is_some()),
        ("username", payload.username.is_some()),
        ("first_name", payload.first_name.is_some()),
        ("last_name", payload.last_name.is_some()),
    ] {
        if !present && !partial {
            errors.add(field, REQUIRED);
        }
    }

    ProfileChanges {
        email: payload
            .email
            .as_deref()
            .and_then(|email| check_email(errors, email)),
        username: payload
            .username
            .as_deref()
            .and_then(|username| check_username(errors, username)),
        first_name: payload.first_name.as_deref().and_then(|first_name| {
            check_text(errors, "first_name", first_name, Some(USER_NAME_MAX_LENGTH))
        }),
        last_name: payload.last_name.as_deref().and_then(|last_name| {
            check_text(errors, "last_name", last_name, Some(USER_NAME_MAX_LENGTH))
        }),
    }
}

pub fn validate_registration(payload: RegisterPayload) -> Result<NewUser, Error> {
    let mut errors = ValidationErrors::default();

    let profile = check_profile(
        ProfilePayload {
            email: payload.email,
            username: payload.username,
            first_name: payload.first_name,
            last_name: payload.last_name,
        },
        false,
        &mut errors,
    );

    let password = match payload.password.as_deref() {
        Some(password) => check_password(&mut errors, "password", password),
        None => {
            errors.add("password", REQUIRED);
            None
        }
    };

    errors.into_result()?;

    match (profile, password) {
        (
            ProfileChanges {
                email: Some(email),
                username: Some(username),
                first_name: Some(first_name),
                last_name: Some(last_name),
            },
            Some(password),
        ) => Ok(NewUser {
            email,
            username,
            first_name,
            last_name,
            password,
        }),
        _ => Err(HttpError::InvalidRequest.new("Incomplete registration")),
    }
}

pub fn validate_profile_changes(payload: ProfilePayload) -> Result<ProfileChanges, Error> {
    let mut errors = ValidationErrors::default();
    let changes = check_profile(payload, true, &mut errors);
    errors.into_result()?;

    Ok(changes)
}

/// Returns `(current_password, new_password)`.
pub fn validate_password_change(payload: SetPasswordPayload) -> Result<(String, String), Error> {
    let mut errors = ValidationErrors::default();

    let current = match payload.current_password {
        Some(current) if !current.is_empty() => Some(current),
        Some(_) => {
            errors.add("current_password", BLANK);
            None
        }
        None => {
            errors.add("current_password", REQUIRED);
            None
        }
    };

    let new = match payload.new_password.as_deref() {
        Some(new) => check_password(&mut errors, "new_password", new),
        None => {
            errors.add("new_password", REQUIRED);
            None
        }
    };

    errors.into_result()?;

    current
        .zip(new)
        .ok_or_else(|| HttpError::InvalidRequest.new("Incomplete password change"))
}

/// Returns `(email, password)`.
pub fn validate_login(payload: LoginPayload) -> Result<(String, String), Error> {
    let mut errors = ValidationErrors::default();

    if payload.email.as_deref().map_or(true, |email| email.trim().is_empty()) {
        errors.add("email", REQUIRED);
    }
    if payload.password.as_deref().map_or(true, str::is_empty) {
        errors.add("password", REQUIRED);
    }

    errors.into_result()?;

    payload
        .email
        .map(|email| normalize_email(&email))
        .zip(payload.password)
        .ok_or_else(|| HttpError::InvalidRequest.new("Incomplete credentials"))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use serde_json::{json, Value};

    use super::*;

    const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn ingredient(id: Uuid, amount: i64) -> IngredientAmountPayload {
        IngredientAmountPayload {
            id,
            amount: IntegerField::Number(amount),
        }
    }

    fn details(error: Error) -> Value {
        assert_eq!(error.kind, HttpError::InvalidRequest);
        error.details.unwrap()
    }

    #[fixture]
    fn payload() -> RecipePayload {
        RecipePayload {
            ingredients: Some(vec![ingredient(1, 200), ingredient(2, 3)]),
            tags: Some(vec![1, 2]),
            image: Some(PNG.to_string()),
            name: Some(String::from("Pancakes")),
            text: Some(String::from("Mix and fry.")),
            cooking_time: Some(IntegerField::Number(20)),
        }
    }

    #[rstest]
    fn complete_recipes_are_accepted(payload: RecipePayload) {
        let recipe = validate_new_recipe(payload).unwrap();

        assert_eq!(recipe.name, "Pancakes");
        assert_eq!(recipe.cooking_time, 20);
        assert_eq!(recipe.tags, vec![1, 2]);
        assert_eq!(
            recipe.ingredients,
            vec![
                IngredientAmount { id: 1, amount: 200 },
                IngredientAmount { id: 2, amount: 3 }
            ]
        );
        assert_eq!(recipe.ingredient_ids(), vec![1, 2]);
        assert_eq!(recipe.image.extension, "png");
    }

    #[rstest]
    fn empty_tags_are_rejected(mut payload: RecipePayload) {
        payload.tags = Some(vec![]);

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert!(details.get("tags").is_some());
    }

    #[rstest]
    fn empty_ingredients_are_rejected(mut payload: RecipePayload) {
        payload.ingredients = Some(vec![]);

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert!(details.get("ingredients").is_some());
    }

    #[rstest]
    fn repeated_ingredients_are_rejected(mut payload: RecipePayload) {
        payload.ingredients = Some(vec![ingredient(4, 10), ingredient(4, 20)]);

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert_eq!(
            details["ingredients"],
            json!(["Ingredient 4 is listed more than once."])
        );
    }

    #[rstest]
    fn repeated_tags_are_rejected(mut payload: RecipePayload) {
        payload.tags = Some(vec![3, 3]);

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert_eq!(details["tags"], json!(["Tag 3 is listed more than once."]));
    }

    #[rstest]
    #[case(0)]
    #[case(-5)]
    #[case(32001)]
    #[case(i64::MAX)]
    fn amounts_out_of_range_are_rejected(mut payload: RecipePayload, #[case] amount: i64) {
        payload.ingredients = Some(vec![ingredient(1, amount)]);

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert!(details.get("ingredients").is_some());
    }

    #[rstest]
    #[case(IntegerField::Number(0))]
    #[case(IntegerField::Number(32001))]
    #[case(IntegerField::Text(String::from("soon")))]
    fn cooking_times_out_of_range_are_rejected(
        mut payload: RecipePayload,
        #[case] cooking_time: IntegerField,
    ) {
        payload.cooking_time = Some(cooking_time);

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert!(details.get("cooking_time").is_some());
    }

    #[rstest]
    fn numeric_strings_are_integers(mut payload: RecipePayload) {
        payload.cooking_time = Some(IntegerField::Text(String::from("45")));
        payload.ingredients = Some(vec![IngredientAmountPayload {
            id: 1,
            amount: IntegerField::Text(String::from("12")),
        }]);

        let recipe = validate_new_recipe(payload).unwrap();
        assert_eq!(recipe.cooking_time, 45);
        assert_eq!(recipe.ingredients[0].amount, 12);
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let details = details(validate_new_recipe(RecipePayload::default()).unwrap_err());

        for field in ["ingredients", "tags", "image", "name", "text", "cooking_time"] {
            assert_eq!(details[field], json!([REQUIRED]), "{field}");
        }
    }

    #[rstest]
    fn long_names_are_rejected(mut payload: RecipePayload) {
        payload.name = Some("x".repeat(RECIPE_NAME_MAX_LENGTH + 1));

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert!(details.get("name").is_some());
    }

    #[rstest]
    fn broken_images_are_rejected(mut payload: RecipePayload) {
        payload.image = Some(String::from("https://example.com/cat.png"));

        let details = details(validate_new_recipe(payload).unwrap_err());
        assert!(details.get("image").is_some());
    }

    #[test]
    fn patches_may_omit_fields() {
        let changes = validate_recipe_changes(RecipePayload {
            name: Some(String::from("Better pancakes")),
            ..RecipePayload::default()
        })
        .unwrap();

        assert_eq!(changes.name.as_deref(), Some("Better pancakes"));
        assert!(changes.ingredients.is_none());
        assert!(changes.tags.is_none());
        assert!(changes.ingredient_ids().is_empty());
    }

    #[test]
    fn patches_still_need_at_least_one_tag() {
        let error = validate_recipe_changes(RecipePayload {
            tags: Some(vec![]),
            ..RecipePayload::default()
        })
        .unwrap_err();

        assert!(details(error).get("tags").is_some());
    }

    #[test]
    fn payloads_accept_numbers_and_strings() {
        let payload: RecipePayload = serde_json::from_value(json!({
            "ingredients": [{ "id": 1, "amount": "10" }, { "id": 2, "amount": 5 }],
            "cooking_time": 15
        }))
        .unwrap();

        assert_eq!(
            payload.ingredients.unwrap()[0].amount,
            IntegerField::Text(String::from("10"))
        );
        assert_eq!(payload.cooking_time, Some(IntegerField::Number(15)));
    }

    #[fixture]
    fn registration() -> RegisterPayload {
        RegisterPayload {
            email: Some(String::from("Cook@Example.com")),
            username: Some(String::from("cook.book")),
            first_name: Some(String::from("Ada")),
            last_name: Some(String::from("Cook")),
            password: Some(String::from("long enough")),
        }
    }

    #[rstest]
    #[case("Ada.Lovelace@Example.COM", "Ada.Lovelace@example.com")]
    #[case(" cook@MAIL.ru ", "cook@mail.ru")]
    #[case("\"a@b\"@Host.org", "\"a@b\"@host.org")]
    fn only_the_email_domain_is_lowercased(#[case] email: &str, #[case] expected: &str) {
        assert_eq!(normalize_email(email), expected);
    }

    #[rstest]
    fn registrations_are_normalized(registration: RegisterPayload) {
        let user = validate_registration(registration).unwrap();

        assert_eq!(user.email, "Cook@example.com");
        assert_eq!(user.username, "cook.book");
    }

    #[rstest]
    #[case("email", "not-an-email")]
    #[case("username", "spaces are bad")]
    #[case("first_name", "   ")]
    #[case("password", "short")]
    fn invalid_registrations_name_the_field(
        mut registration: RegisterPayload,
        #[case] field: &str,
        #[case] value: &str,
    ) {
        let value = Some(value.to_string());
        match field {
            "email" => registration.email = value,
            "username" => registration.username = value,
            "first_name" => registration.first_name = value,
            _ => registration.password = value,
        }

        let details = details(validate_registration(registration).unwrap_err());
        assert!(details.get(field).is_some(), "{details}");
    }

    #[test]
    fn profile_changes_are_partial() {
        let changes = validate_profile_changes(ProfilePayload {
            first_name: Some(String::from("  Grace ")),
            ..ProfilePayload::default()
        })
        .unwrap();

        assert_eq!(
            changes,
            ProfileChanges {
                first_name: Some(String::from("Grace")),
                ..ProfileChanges::default()
            }
        );
    }

    #[test]
    fn password_changes_need_both_passwords() {
        let error = validate_password_change(SetPasswordPayload {
            current_password: None,
            new_password: Some(String::from("brand new password")),
        })
        .unwrap_err();

        assert!(details(error).get("current_password").is_some());

        let (current, new) = validate_password_change(SetPasswordPayload {
            current_password: Some(String::from("old password")),
            new_password: Some(String::from("brand new password")),
        })
        .unwrap();

        assert_eq!(current, "old password");
        assert_eq!(new, "brand new password");
    }

    #[test]
    fn logins_need_credentials() {
        let error = validate_login(LoginPayload {
            email: Some(String::from(" ")),
            password: None,
        })
        .unwrap_err();

        let details = details(error);
        assert!(details.get("email").is_some());
        assert!(details.get("password").is_some());

        let (email, _) = validate_login(LoginPayload {
            email: Some(String::from("Cook@Example.com ")),
            password: Some(String::from("secret")),
        })
        .unwrap();
        assert_eq!(email, "Cook@example.com");
    }
}
