mod common;

use common::{body, spawn_app};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn names(page: &Value) -> Vec<String> {
    page["items"]
        .as_array()
        .expect("No items")
        .iter()
        .map(|item| item["name"].as_str().unwrap_or_default().to_owned())
        .collect()
}

#[tokio::test]
async fn listing_shows_active_products_by_name() {
    let app = spawn_app().await;
    app.create_product("Dune", "9.99").await;
    app.create_product("Beloved", "12.99").await;
    let hidden = app.create_product("Anathem", "15.00").await;
    app.set_product_flags(&hidden, false, true).await;

    let response = app
        .get("/api/products", None)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let page = body(response).await;
    assert_eq!(names(&page), vec!["Beloved", "Dune"]);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"][0]["price"], "12.99");
}

#[tokio::test]
async fn listing_is_paginated_four_at_a_time() {
    let app = spawn_app().await;
    for name in ["A1", "A2", "A3", "A4", "A5", "A6"] {
        app.create_product(name, "1.00").await;
    }

    let first = body(app.get("/api/products", None).send().await.expect("request")).await;
    assert_eq!(names(&first), vec!["A1", "A2", "A3", "A4"]);
    assert_eq!(first["page_size"], 4);
    assert_eq!(first["total"], 6);

    let second = body(
        app.get("/api/products?page=2", None)
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(names(&second), vec!["A5", "A6"]);
}

#[tokio::test]
async fn listing_filters_by_tag_stock_and_search() {
    let app = spawn_app().await;
    let dune = app.create_product("Dune", "9.99").await;
    let emma = app.create_product("Emma", "7.00").await;
    app.create_product("Dracula", "6.00").await;
    let scifi = app.create_tag("Science Fiction", true).await;
    app.tag_product(&dune, &scifi).await;
    app.set_product_flags(&emma, true, false).await;

    let tagged = body(
        app.get("/api/products?tag=science-fiction", None)
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(names(&tagged), vec!["Dune"]);
    assert_eq!(tagged["items"][0]["tags"][0]["slug"], "science-fiction");

    let all = body(
        app.get("/api/products?tag=all", None)
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(all["total"], 3);

    let in_stock = body(
        app.get("/api/products?in_stock=false", None)
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(names(&in_stock), vec!["Emma"]);

    let searched = body(
        app.get("/api/products?search=Dr", None)
            .send()
            .await
            .expect("request"),
    )
    .await;
    assert_eq!(names(&searched), vec!["Dracula"]);
}

#[tokio::test]
async fn unknown_tag_is_not_found() {
    let app = spawn_app().await;
    let hidden = app.create_tag("Hidden", false).await;

    for slug in ["no-such-tag", hidden.slug.as_str()] {
        let response = app
            .get(&format!("/api/products?tag={slug}"), None)
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn product_detail_by_slug() {
    let app = spawn_app().await;
    let dune = app.create_product("Dune", "9.99").await;
    let old = app.create_product("Old Stock", "1.00").await;
    app.set_product_flags(&old, false, true).await;

    let response = app
        .get("/api/product/dune", None)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body(response).await;
    assert_eq!(detail["id"], dune.id);
    assert_eq!(detail["images"], json!([]));

    for slug in ["old-stock", "missing"] {
        let response = app
            .get(&format!("/api/product/{slug}"), None)
            .send()
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn tags_list_only_active_ones() {
    let app = spawn_app().await;
    app.create_tag("Poetry", true).await;
    app.create_tag("Drafts", false).await;

    let tags = body(app.get("/api/tags", None).send().await.expect("request")).await;
    let slugs: Vec<&str> = tags
        .as_array()
        .expect("Not a list")
        .iter()
        .filter_map(|tag| tag["slug"].as_str())
        .collect();
    assert_eq!(slugs, vec!["poetry"]);
}

#[tokio::test]
async fn static_pages() {
    let app = spawn_app().await;

    let about = app.get("/api/about-us", None).send().await.expect("request");
    assert_eq!(about.status(), StatusCode::OK);
    assert_eq!(body(about).await["name"], "BookTime");

    let response = app
        .post("/api/contact-us", None)
        .json(&json!({ "name": "Ada", "message": "Do you stock maps?" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .post("/api/contact-us", None)
        .json(&json!({ "name": "", "message": "" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
