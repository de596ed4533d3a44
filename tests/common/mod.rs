#![allow(dead_code)]

use booktime::{
    app,
    config::Config,
    entities::{address, product, product_tag, product_tag_link, user},
    middleware::auth::generate_token,
    prepare_database,
};
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

pub const PASSWORD: &str = "correct-horse-battery";

#[derive(Clone, Copy, Debug)]
pub enum Role {
    Customer,
    Owner,
    Office,
    Dispatcher,
}

pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub db: DatabaseConnection,
    pub config: Config,
    pub media_root: PathBuf,
    password_hash: String,
}

/// Serves the whole app on an ephemeral port against a fresh SQLite file.
pub async fn spawn_app() -> TestApp {
    let dir = std::env::temp_dir().join(format!("booktime-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("Failed to create test directory");
    let db_path = dir.join("booktime.db");
    let media_root = dir.join("media");

    let config = Config::for_database(
        format!("sqlite://{}?mode=rwc", db_path.display()),
        media_root.clone(),
    );
    let db = prepare_database(&config)
        .await
        .expect("Failed to prepare database");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let address = format!("http://{}", listener.local_addr().expect("No local address"));
    let router = app(db.clone(), config.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    TestApp {
        address,
        client: Client::new(),
        db,
        config,
        media_root,
        password_hash: user::hash_password(PASSWORD).expect("Failed to hash password"),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub fn get(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        authorize(self.client.get(self.url(path)), token)
    }

    pub fn post(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        authorize(self.client.post(self.url(path)), token)
    }

    pub fn patch(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        authorize(self.client.patch(self.url(path)), token)
    }

    pub fn delete(&self, path: &str, token: Option<&str>) -> RequestBuilder {
        authorize(self.client.delete(self.url(path)), token)
    }

    /// Inserts an account with `PASSWORD` and returns it with a fresh token.
    pub async fn create_user(&self, email: &str, role: Role) -> (user::Model, String) {
        let (is_superuser, is_employee, is_dispatcher) = match role {
            Role::Customer => (false, false, false),
            Role::Owner => (true, true, false),
            Role::Office => (false, true, false),
            Role::Dispatcher => (false, false, true),
        };
        let model = user::ActiveModel {
            email: Set(email.to_owned()),
            password: Set(self.password_hash.clone()),
            first_name: Set(String::new()),
            last_name: Set(String::new()),
            is_active: Set(true),
            is_employee: Set(is_employee),
            is_dispatcher: Set(is_dispatcher),
            is_superuser: Set(is_superuser),
            date_joined: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert user");

        let token = generate_token(&model, &self.config.secret, 1).expect("Failed to sign token");
        (model, token)
    }

    pub async fn create_product(&self, name: &str, price: &str) -> product::Model {
        product::ActiveModel {
            name: Set(name.to_owned()),
            slug: Set(product::slugify(name)),
            description: Set(format!("All about {name}")),
            price: Set(Decimal::from_str(price).expect("Bad price")),
            in_stock: Set(true),
            active: Set(true),
            date_updated: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert product")
    }

    pub async fn set_product_flags(&self, product: &product::Model, active: bool, in_stock: bool) {
        let mut model: product::ActiveModel = product.clone().into();
        model.active = Set(active);
        model.in_stock = Set(in_stock);
        model.update(&self.db).await.expect("Failed to update product");
    }

    pub async fn create_tag(&self, name: &str, active: bool) -> product_tag::Model {
        product_tag::ActiveModel {
            name: Set(name.to_owned()),
            slug: Set(product::slugify(name)),
            description: Set(String::new()),
            active: Set(active),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert tag")
    }

    pub async fn tag_product(&self, product: &product::Model, tag: &product_tag::Model) {
        product_tag_link::Entity::insert(product_tag_link::ActiveModel {
            product_id: Set(product.id),
            tag_id: Set(tag.id),
        })
        .exec(&self.db)
        .await
        .expect("Failed to tag product");
    }

    pub async fn create_address(&self, user_id: i32, name: &str, country: &str) -> address::Model {
        address::ActiveModel {
            user_id: Set(user_id),
            name: Set(name.to_owned()),
            address1: Set("1 High Street".to_owned()),
            address2: Set(None),
            zip_code: Set("AB1 2CD".to_owned()),
            city: Set("Leeds".to_owned()),
            country: Set(country.to_owned()),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .expect("Failed to insert address")
    }

    /// Fills the user's basket and checks it out; returns the order body.
    pub async fn place_order(&self, token: &str, user_id: i32, lines: &[(i32, i32)]) -> Value {
        for (product_id, quantity) in lines {
            let response = self
                .post("/api/basket", Some(token))
                .json(&json!({ "product_id": product_id, "quantity": quantity }))
                .send()
                .await
                .expect("Failed to add to basket");
            assert!(response.status().is_success());
        }

        let address = self.create_address(user_id, "Home", "uk").await;
        let response = self
            .post("/api/checkout", Some(token))
            .json(&json!({
                "billing_address_id": address.id,
                "shipping_address_id": address.id,
            }))
            .send()
            .await
            .expect("Failed to check out");
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.expect("Bad checkout body")
    }

    /// Moves an order to `status` through the owners site.
    pub async fn set_order_status(&self, owner_token: &str, order_id: i64, status: &str) {
        let response = self
            .patch(&format!("/admin/orders/{order_id}"), Some(owner_token))
            .json(&json!({ "status": status }))
            .send()
            .await
            .expect("Failed to patch order");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

fn authorize(builder: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => builder.bearer_auth(token),
        None => builder,
    }
}

pub async fn body(response: reqwest::Response) -> Value {
    response.json().await.expect("Response body is not JSON")
}

pub async fn product_row(db: &DatabaseConnection, id: i32) -> product::Model {
    product::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("Query failed")
        .expect("Product missing")
}
