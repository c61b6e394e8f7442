//! Admin back-office: catalogue management.
//!
//! Every route here runs behind `require_admin`: the session's email must
//! equal the configured admin email, otherwise 403.

pub mod handlers;

use crate::http::ResponseStyle::Enveloped;
use crate::routes::Routes;
use crate::security::{schemas, Schema};

use self::handlers::*;

pub fn register(routes: Routes) -> Routes {
    let admin_only = |routes: &Routes| routes.pipeline(Enveloped).stage(routes.require_admin()).build();
    let admin_with = |routes: &Routes, schema: Schema| {
        routes
            .pipeline(Enveloped)
            .stage(routes.require_admin())
            .stage(routes.validate(schema))
            .build()
    };

    let list = admin_only(&routes);
    let create = admin_with(&routes, schemas::product());
    let update = admin_with(&routes, schemas::product_update());
    let delete = admin_only(&routes);
    let category = admin_with(&routes, schemas::category());

    routes
        .get("/api/admin/products", list, list_products)
        .post("/api/admin/products", create, create_product)
        .put("/api/admin/products/{id}", update, update_product)
        .delete("/api/admin/products/{id}", delete, delete_product)
        .post("/api/admin/categories", category, create_category)
}
