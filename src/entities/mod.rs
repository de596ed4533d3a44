pub mod address;
pub mod basket;
pub mod basket_line;
pub mod order;
pub mod order_line;
pub mod product;
pub mod product_image;
pub mod product_tag;
pub mod product_tag_link;
pub mod user;

use chrono::Utc;
use sea_orm::{
    sea_query::{Index, IndexCreateStatement, TableCreateStatement},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Schema,
    Set,
};

pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let tables: Vec<TableCreateStatement> = vec![
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(address::Entity),
        schema.create_table_from_entity(product::Entity),
        schema.create_table_from_entity(product_tag::Entity),
        schema.create_table_from_entity(product_tag_link::Entity),
        schema.create_table_from_entity(product_image::Entity),
        schema.create_table_from_entity(basket::Entity),
        schema.create_table_from_entity(basket_line::Entity),
        schema.create_table_from_entity(order::Entity),
        schema.create_table_from_entity(order_line::Entity),
    ];

    for mut table in tables {
        table.if_not_exists();
        db.execute(backend.build(&table)).await?;
    }

    let indexes: Vec<IndexCreateStatement> = vec![Index::create()
        .name("idx_basket_line_basket_product")
        .table(basket_line::Entity)
        .col(basket_line::Column::BasketId)
        .col(basket_line::Column::ProductId)
        .unique()
        .if_not_exists()
        .to_owned()];

    for index in indexes {
        db.execute(backend.build(&index)).await?;
    }

    tracing::info!("Database schema is ready");
    Ok(())
}

/// Creates the first superuser so the owners site is reachable. Does nothing
/// when the email is already taken.
pub async fn seed_owner(db: &DatabaseConnection, email: &str, password: &str) -> Result<(), DbErr> {
    let email = user::normalize_email(email);
    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let password_hash = user::hash_password(password)
        .map_err(|err| DbErr::Custom(format!("Failed to hash owner password: {err}")))?;

    let owner = user::ActiveModel {
        email: Set(email.clone()),
        password: Set(password_hash),
        first_name: Set(String::new()),
        last_name: Set(String::new()),
        is_active: Set(true),
        is_employee: Set(true),
        is_dispatcher: Set(false),
        is_superuser: Set(true),
        date_joined: Set(Utc::now()),
        ..Default::default()
    };
    user::Entity::insert(owner).exec(db).await?;

    tracing::info!(email = %email, "Seeded owner account");
    Ok(())
}
