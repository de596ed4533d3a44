use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub user_id: i32,
    #[sea_orm(unique)]
    pub basket_id: i32,
    pub status: Status,

    pub billing_name: String,
    pub billing_address1: String,
    pub billing_address2: Option<String>,
    pub billing_zip_code: String,
    pub billing_city: String,
    pub billing_country: String,

    pub shipping_name: String,
    pub shipping_address1: String,
    pub shipping_address2: Option<String>,
    pub shipping_zip_code: String,
    pub shipping_city: String,
    pub shipping_country: String,

    pub date_added: DateTimeUtc,
    pub date_updated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::basket::Entity",
        from = "Column::BasketId",
        to = "super::basket::Column::Id"
    )]
    Basket,
    #[sea_orm(has_many = "super::order_line::Entity")]
    Line,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Line.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(
    rs_type = "String",
    db_type = "String(StringLen::N(16))",
    enum_name = "order_status"
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

impl Status {
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;

        matches!(
            (self, next),
            (Created, Paid) | (Paid, Shipped) | (Paid, Refunded) | (Shipped, Refunded)
        ) || self == next
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Shipped => "shipped",
            Self::Refunded => "refunded",
        };
        f.write_str(status)
    }
}

#[cfg(test)]
mod tests {
    use super::Status::*;
    use super::*;

    #[test]
    fn forward_transitions_are_allowed() {
        assert!(Created.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Shipped.can_transition_to(Refunded));
    }

    #[test]
    fn skipping_or_going_back_is_rejected() {
        assert!(!Created.can_transition_to(Shipped));
        assert!(!Created.can_transition_to(Refunded));
        assert!(!Paid.can_transition_to(Created));
        assert!(!Shipped.can_transition_to(Paid));
        assert!(!Refunded.can_transition_to(Paid));
    }

    #[test]
    fn same_status_is_a_no_op() {
        for status in [Created, Paid, Shipped, Refunded] {
            assert!(status.can_transition_to(status));
        }
    }

    #[test]
    fn status_text_matches_the_wire_format() {
        for status in [Created, Paid, Shipped, Refunded] {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.to_string())
            );
        }
    }
}
