pub const DEFAULT_PAGE_SIZE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const AMOUNT_MIN: i32 = 1;
pub const AMOUNT_MAX: i32 = 32000;

pub const COOKING_TIME_MIN: i32 = 1;
pub const COOKING_TIME_MAX: i32 = 32000;

pub const RECIPE_NAME_MAX_LENGTH: usize = 200;
pub const USER_NAME_MAX_LENGTH: usize = 150;
pub const EMAIL_MAX_LENGTH: usize = 254;
pub const PASSWORD_MIN_LENGTH: usize = 8;

pub const MAX_REQUEST_BODY: u64 = 10 * 1024 * 1024;

pub const RECIPE_IMAGE_DIR: &str = "recipes/images";
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

pub const SHOPPING_LIST_TITLE: &str = "Список ингредиентов";
pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.pdf";

pub const CATALOG_CACHE_KEY: &str = "catalog-cache-key";
pub const CATALOG_CACHE_TTL: u64 = 60 * 60;
