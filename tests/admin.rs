mod common;

use common::{body, product_row, spawn_app, Role};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn sites_admit_only_their_role() {
    let app = spawn_app().await;
    let (_, customer) = app.create_user("customer@example.com", Role::Customer).await;
    let (_, office) = app.create_user("office@example.com", Role::Office).await;
    let (_, dispatcher) = app.create_user("dispatch@example.com", Role::Dispatcher).await;

    let response = app.get("/admin", None).send().await.expect("request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for (path, token) in [
        ("/admin", &customer),
        ("/admin", &office),
        ("/office-admin", &dispatcher),
        ("/dispatch-admin", &office),
    ] {
        let response = app.get(path, Some(token)).send().await.expect("request");
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
    }

    let response = app.get("/office-admin", Some(&office)).send().await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let index = body(response).await;
    assert_eq!(index["site"], "central_office");
    assert_eq!(index["user"], "office@example.com");
    assert_eq!(index["site_header_color"], "purple");
    assert_eq!(
        index["resources"],
        json!(["products", "tags", "images", "addresses", "orders"])
    );
}

#[tokio::test]
async fn sites_expose_only_their_resources() {
    let app = spawn_app().await;
    let (_, office) = app.create_user("office@example.com", Role::Office).await;
    let (_, dispatcher) = app.create_user("dispatch@example.com", Role::Dispatcher).await;

    for (path, token) in [
        ("/office-admin/users", &office),
        ("/office-admin/baskets", &office),
        ("/dispatch-admin/addresses", &dispatcher),
        ("/dispatch-admin/images", &dispatcher),
    ] {
        let response = app.get(path, Some(token)).send().await.expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn office_staff_cannot_reprice_but_can_restock() {
    let app = spawn_app().await;
    let (_, office) = app.create_user("office@example.com", Role::Office).await;
    let dune = app.create_product("Dune", "9.99").await;
    let path = format!("/office-admin/products/{}", dune.id);

    let response = app
        .patch(&path, Some(&office))
        .json(&json!({ "price": "1.99", "in_stock": false }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body(response).await["fields"], json!(["price"]));

    let response = app
        .patch(&path, Some(&office))
        .json(&json!({ "in_stock": false, "description": "Spice" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let patched = body(response).await;
    assert_eq!(patched["in_stock"], false);
    assert_eq!(
        patched["read_only_fields"],
        json!(["name", "slug", "price", "tags"])
    );

    let stored = product_row(&app.db, dune.id).await;
    assert!(!stored.in_stock);
    assert_eq!(stored.price.to_string(), "9.99");
}

#[tokio::test]
async fn owners_manage_the_catalogue() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (_, office) = app.create_user("office@example.com", Role::Office).await;
    let poetry = app.create_tag("Poetry", true).await;

    let response = app
        .post("/office-admin/products", Some(&office))
        .json(&json!({ "name": "Odes", "price": "4.99" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post("/admin/products", Some(&owner))
        .json(&json!({ "name": "Leaves of Grass", "price": "4.99", "tags": [poetry.id] }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body(response).await;
    assert_eq!(created["slug"], "leaves-of-grass");
    assert_eq!(created["tags"][0]["slug"], "poetry");
    let id = created["id"].as_i64().expect("No id");

    let response = app
        .post("/admin/products", Some(&owner))
        .json(&json!({ "name": "Leaves of Grass", "price": "5.99" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post("/admin/products", Some(&owner))
        .json(&json!({ "name": "Cheap", "price": "0.999" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .patch(&format!("/admin/products/{id}"), Some(&owner))
        .json(&json!({ "price": "6.99" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["price"], "6.99");

    let response = app
        .post("/admin/products/actions", Some(&owner))
        .json(&json!({ "action": "make_inactive", "ids": [id] }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["updated"], 1);

    let response = app
        .get("/api/product/leaves-of-grass", None)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .post("/admin/products/actions", Some(&owner))
        .json(&json!({ "action": "delete", "ids": [id] }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dispatchers_see_paid_orders_without_billing() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (_, dispatcher) = app.create_user("dispatch@example.com", Role::Dispatcher).await;
    let (buyer, token) = app.create_user("buyer@example.com", Role::Customer).await;
    let dune = app.create_product("Dune", "9.99").await;

    let unpaid = app.place_order(&token, buyer.id, &[(dune.id, 1)]).await;
    let paid = app.place_order(&token, buyer.id, &[(dune.id, 2)]).await;
    let paid_id = paid["id"].as_i64().expect("No id");
    app.set_order_status(&owner, paid_id, "paid").await;

    let orders = body(
        app.get("/dispatch-admin/orders", Some(&dispatcher))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(orders["total"], 1);
    let orders = orders["items"].as_array().expect("Not a list").clone();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"], paid_id);
    assert_eq!(orders[0]["lines"][0]["quantity"], 2);
    assert!(orders[0].get("billing_name").is_none());
    assert!(orders[0]["lines"][0].get("unit_price").is_none());
    assert!(orders[0].get("total").is_none());

    let response = app
        .get(&format!("/dispatch-admin/orders/{}", unpaid["id"]), Some(&dispatcher))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .patch(&format!("/dispatch-admin/orders/{paid_id}"), Some(&dispatcher))
        .json(&json!({ "billing_city": "Paris" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .patch(&format!("/dispatch-admin/orders/{paid_id}"), Some(&dispatcher))
        .json(&json!({ "shipping_city": "York" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["shipping_city"], "York");
}

#[tokio::test]
async fn order_status_moves_forward_only() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (_, office) = app.create_user("office@example.com", Role::Office).await;
    let (buyer, token) = app.create_user("buyer@example.com", Role::Customer).await;
    let dune = app.create_product("Dune", "9.99").await;
    let order = app.place_order(&token, buyer.id, &[(dune.id, 1)]).await;
    let id = order["id"].as_i64().expect("No id");

    let response = app
        .patch(&format!("/admin/orders/{id}"), Some(&owner))
        .json(&json!({ "status": "shipped" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .patch(&format!("/office-admin/orders/{id}"), Some(&office))
        .json(&json!({ "status": "paid" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["status"], "paid");

    let response = app
        .patch(&format!("/office-admin/orders/{id}"), Some(&office))
        .json(&json!({ "user_id": buyer.id }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body(response).await["fields"], json!(["user_id"]));

    let response = app
        .patch(&format!("/admin/orders/{id}"), Some(&owner))
        .json(&json!({ "user_id": 9999 }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn orders_filter_by_status_and_country() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (buyer, token) = app.create_user("buyer@example.com", Role::Customer).await;
    let dune = app.create_product("Dune", "9.99").await;
    let first = app.place_order(&token, buyer.id, &[(dune.id, 1)]).await;
    app.place_order(&token, buyer.id, &[(dune.id, 1)]).await;
    app.set_order_status(&owner, first["id"].as_i64().expect("No id"), "paid")
        .await;

    let paid = body(
        app.get("/admin/orders?status=paid", Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(paid["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(paid["items"][0]["id"], first["id"]);

    let abroad = body(
        app.get("/admin/orders?shipping_country=us", Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(abroad["items"], json!([]));
    assert_eq!(abroad["total"], 0);

    let all = body(app.get("/admin/orders", Some(&owner)).send().await.expect("request")).await;
    assert_eq!(all["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(all["total"], 2);

    let second = body(
        app.get("/admin/orders?page=2&page_size=1", Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(second["page"], 2);
    assert_eq!(second["total"], 2);
    assert_eq!(second["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(second["items"][0]["id"], first["id"]);
}

#[tokio::test]
async fn owners_manage_accounts() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;

    let response = app
        .post("/admin/users", Some(&owner))
        .json(&json!({
            "email": "Clerk@Example.com",
            "password": "longenough",
            "password_confirm": "longenough",
            "is_employee": true
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body(response).await;
    assert_eq!(created["email"], "clerk@example.com");
    assert_eq!(created["is_employee"], true);
    assert!(created.get("password").is_none());

    let found = body(
        app.get("/admin/users?search=clerk", Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(found.as_array().map(Vec::len), Some(1));

    let response = app
        .post("/login", None)
        .json(&json!({ "email": "clerk@example.com", "password": "longenough" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let clerk = body(response).await["token"]
        .as_str()
        .expect("No token")
        .to_owned();
    let response = app.get("/office-admin", Some(&clerk)).send().await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn tag_identity_belongs_to_superusers() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (_, office) = app.create_user("office@example.com", Role::Office).await;

    let response = app
        .post("/admin/tags", Some(&owner))
        .json(&json!({ "name": "Science Fiction" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CREATED);
    let tag = body(response).await;
    assert_eq!(tag["slug"], "science-fiction");
    let path = format!("/office-admin/tags/{}", tag["id"]);

    let response = app
        .post("/admin/tags", Some(&owner))
        .json(&json!({ "name": "Science fiction" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .patch(&path, Some(&office))
        .json(&json!({ "name": "SF" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .patch(&path, Some(&office))
        .json(&json!({ "active": false }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["read_only_fields"], json!(["name", "slug"]));
}

#[tokio::test]
async fn order_country_errors_name_the_field() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (buyer, token) = app.create_user("buyer@example.com", Role::Customer).await;
    let dune = app.create_product("Dune", "9.99").await;
    let order = app.place_order(&token, buyer.id, &[(dune.id, 1)]).await;

    let response = app
        .patch(&format!("/admin/orders/{}", order["id"]), Some(&owner))
        .json(&json!({ "billing_country": "fr", "shipping_country": "us" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body(response).await["fields"],
        json!({ "billing_country": ["unsupported_country"] })
    );
}

#[tokio::test]
async fn staff_edit_addresses_but_not_their_owner() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (_, office) = app.create_user("office@example.com", Role::Office).await;
    let (buyer, _) = app.create_user("buyer@example.com", Role::Customer).await;
    let (other, _) = app.create_user("other@example.com", Role::Customer).await;
    let home = app.create_address(buyer.id, "Home", "uk").await;
    app.create_address(other.id, "Work", "us").await;

    let all = body(app.get("/admin/addresses", Some(&owner)).send().await.expect("request")).await;
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let mine = body(
        app.get(&format!("/office-admin/addresses?user_id={}", buyer.id), Some(&office))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));
    assert_eq!(mine[0]["name"], "Home");

    let path = format!("/office-admin/addresses/{}", home.id);
    let response = app
        .patch(&path, Some(&office))
        .json(&json!({ "city": "York" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let patched = body(response).await;
    assert_eq!(patched["city"], "York");
    assert_eq!(patched["user_id"], buyer.id);

    let response = app
        .patch(&path, Some(&office))
        .json(&json!({ "user_id": other.id }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body(response).await["fields"], json!(["user_id"]));

    let response = app
        .patch(&path, Some(&office))
        .json(&json!({ "country": "fr" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let viewed = body(
        app.get(&format!("/admin/addresses/{}", home.id), Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(viewed["city"], "York");
    assert_eq!(viewed["country"], "uk");
    assert_eq!(viewed["user_id"], buyer.id);
}

#[tokio::test]
async fn owners_inspect_and_close_baskets() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (buyer, buyer_token) = app.create_user("buyer@example.com", Role::Customer).await;
    let (shopper, shopper_token) = app.create_user("shopper@example.com", Role::Customer).await;
    let dune = app.create_product("Dune", "9.99").await;
    let emma = app.create_product("Emma", "7.00").await;

    let order = app.place_order(&buyer_token, buyer.id, &[(dune.id, 2)]).await;
    let converted = order["basket_id"].as_i64().expect("No basket id");
    for (product_id, quantity) in [(dune.id, 1), (emma.id, 3)] {
        app.post("/api/basket", Some(&shopper_token))
            .json(&json!({ "product_id": product_id, "quantity": quantity }))
            .send()
            .await
            .expect("request");
    }

    let open = body(
        app.get("/admin/baskets?status=open", Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(open["total"], 1);
    assert_eq!(open["items"][0]["user_id"], shopper.id);
    assert_eq!(open["items"][0]["count"], 4);
    let open_id = open["items"][0]["id"].as_i64().expect("No id");

    let submitted = body(
        app.get("/admin/baskets?status=submitted", Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(submitted["total"], 1);
    assert_eq!(submitted["items"][0]["id"], converted);
    assert_eq!(submitted["items"][0]["count"], 2);

    let all = body(app.get("/admin/baskets", Some(&owner)).send().await.expect("request")).await;
    assert_eq!(all["total"], 2);

    let detail = body(
        app.get(&format!("/admin/baskets/{open_id}"), Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(detail["user_id"], shopper.id);
    assert_eq!(detail["status"], "open");
    assert_eq!(detail["lines"][0]["product_name"], "Dune");
    assert_eq!(detail["lines"][1]["product_name"], "Emma");
    assert_eq!(detail["lines"][1]["quantity"], 3);
    assert_eq!(detail["total"], "30.99");

    let response = app
        .patch(&format!("/admin/baskets/{open_id}"), Some(&owner))
        .json(&json!({ "status": "submitted" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["status"], "submitted");

    let basket = body(
        app.get("/api/basket", Some(&shopper_token))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert!(basket["id"].is_null());

    let response = app
        .patch(&format!("/admin/baskets/{open_id}"), Some(&owner))
        .json(&json!({ "status": "open" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body(response).await["status"], "open");
}

#[tokio::test]
async fn converted_baskets_cannot_be_reopened() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (buyer, token) = app.create_user("buyer@example.com", Role::Customer).await;
    let dune = app.create_product("Dune", "9.99").await;

    let order = app.place_order(&token, buyer.id, &[(dune.id, 1)]).await;
    let converted = order["basket_id"].as_i64().expect("No basket id");

    let response = app
        .patch(&format!("/admin/baskets/{converted}"), Some(&owner))
        .json(&json!({ "status": "open" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let basket = body(app.get("/api/basket", Some(&token)).send().await.expect("request")).await;
    assert!(basket["id"].is_null());

    let detail = body(
        app.get(&format!("/admin/baskets/{converted}"), Some(&owner))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(detail["status"], "submitted");
    assert_eq!(detail["lines"][0]["quantity"], 1);
}

#[tokio::test]
async fn reopening_never_gives_a_user_two_open_baskets() {
    let app = spawn_app().await;
    let (_, owner) = app.create_user("owner@example.com", Role::Owner).await;
    let (_, token) = app.create_user("shopper@example.com", Role::Customer).await;
    let dune = app.create_product("Dune", "9.99").await;

    let first = body(
        app.post("/api/basket", Some(&token))
            .json(&json!({ "product_id": dune.id }))
            .send()
            .await
            .expect("request"),
    )
    .await;
    let first_id = first["id"].as_i64().expect("No basket id");

    let response = app
        .patch(&format!("/admin/baskets/{first_id}"), Some(&owner))
        .json(&json!({ "status": "submitted" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let second = body(
        app.post("/api/basket", Some(&token))
            .json(&json!({ "product_id": dune.id }))
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_ne!(second["id"], first["id"]);

    let response = app
        .patch(&format!("/admin/baskets/{first_id}"), Some(&owner))
        .json(&json!({ "status": "open" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
