pub const RECIPE_COUNT_PER_PAGE: i64 = 6;
pub const USER_COUNT_PER_PAGE: i64 = 6;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NAME_LEN: usize = 150;
pub const MAX_RECIPE_NAME_LEN: usize = 200;
pub const MAX_RECIPE_TEXT_LEN: usize = 1000;

pub const SHOPPING_LIST_FILENAME: &str = "shopping_list.txt";
pub const RECIPE_IMAGE_DIR: &str = "recipes";

/// Upper bound for JSON request bodies; recipe payloads carry base64 images.
pub const MAX_BODY_BYTES: u64 = 8 * 1024 * 1024;

pub const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("png", "png"),
    ("jpeg", "jpg"),
    ("jpg", "jpg"),
    ("gif", "gif"),
    ("webp", "webp"),
];
