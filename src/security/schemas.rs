//! Request body schemas used by the storefront routes.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::security::schema::{Field, Schema};

static UPPERCASE: Lazy<Regex> = Lazy::new(|| Regex::new("[A-Z]").expect("static regex"));
static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new("[0-9]").expect("static regex"));
static SPECIAL: Lazy<Regex> = Lazy::new(|| Regex::new("[^A-Za-z0-9]").expect("static regex"));
static SLUG: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("static regex"));

pub fn email() -> Field {
    Field::string("email").email("Invalid email address")
}

/// Password strength: length, uppercase, digit, symbol. Lowercase is not required.
pub fn password() -> Field {
    Field::string("password")
        .min_length(8, "Password must be at least 8 characters")
        .pattern(&UPPERCASE, "Password must contain uppercase letter")
        .pattern(&DIGIT, "Password must contain number")
        .pattern(&SPECIAL, "Password must contain special character")
}

pub fn signup() -> Schema {
    Schema::object()
        .field(email())
        .field(password())
        .field(
            Field::string("name")
                .min_length(2, "Name must be at least 2 characters")
                .max_length(100, "Name must be at most 100 characters"),
        )
}

pub fn signin() -> Schema {
    Schema::object()
        .field(email())
        .field(Field::string("password").min_length(1, "Password required"))
}

/// New password chosen with a token issued at signup. Same strength rules as signup.
pub fn reset_password() -> Schema {
    Schema::object()
        .field(Field::string("token").min_length(1, "Token required"))
        .field(password())
}

fn product_fields(all_optional: bool) -> Schema {
    let required = |field: Field| if all_optional { field.optional() } else { field };

    Schema::object()
        .field(required(
            Field::string("title")
                .min_length(3, "Title required")
                .max_length(200, "Title must be at most 200 characters"),
        ))
        .field(
            Field::string("description")
                .max_length(5000, "Description must be at most 5000 characters")
                .optional(),
        )
        .field(required(Field::number("price").positive("Price must be positive")))
        .field(required(Field::integer("stock").min(0.0, "Stock cannot be negative")))
        .field(Field::integer("categoryId").positive("Invalid category").optional())
        .field(required(Field::string("imageUrl").url("Invalid image URL")))
        .field(
            Field::number("discountPercentage")
                .min(0.0, "Discount cannot be negative")
                .max(100.0, "Discount cannot exceed 100")
                .optional(),
        )
}

pub fn product() -> Schema {
    product_fields(false)
}

/// Partial update: every product field optional, same constraints.
pub fn product_update() -> Schema {
    product_fields(true)
}

pub fn category() -> Schema {
    Schema::object()
        .field(
            Field::string("name")
                .min_length(2, "Name required")
                .max_length(100, "Name must be at most 100 characters"),
        )
        .field(
            Field::string("slug")
                .min_length(2, "Slug required")
                .max_length(100, "Slug must be at most 100 characters")
                .pattern(&SLUG, "Slug must be lowercase words separated by hyphens"),
        )
}

pub fn checkout() -> Schema {
    let item = Schema::object()
        .field(Field::integer("productId").positive("Invalid product"))
        .field(
            Field::integer("quantity")
                .min(1.0, "Quantity must be at least 1")
                .max(99.0, "Quantity must be at most 99"),
        );

    Schema::object()
        .field(email())
        .field(Field::string("name").min_length(2, "Name must be at least 2 characters"))
        .field(Field::string("address").min_length(5, "Address must be at least 5 characters"))
        .field(Field::string("city").min_length(2, "City must be at least 2 characters"))
        .field(Field::string("postalCode").min_length(3, "Postal code must be at least 3 characters"))
        .field(Field::string("country").min_length(2, "Country must be at least 2 characters"))
        .field(
            Field::array_of("items", item)
                .min_items(1, "Cart is empty")
                .max_items(50, "Too many items"),
        )
}

pub fn profile() -> Schema {
    Schema::object()
        .field(Field::string("name").min_length(1, "Name cannot be empty").optional())
        .field(email().optional())
}

pub fn wishlist() -> Schema {
    Schema::object().field(Field::integer("productId").positive("Invalid product"))
}
