use serde::Serialize;

use crate::entities::user;

/// The three admin surfaces. They share one schema and differ in who may
/// enter and which records and fields they expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminSite {
    Owners,
    CentralOffice,
    Dispatchers,
}

/// Resources an admin site can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Users,
    Products,
    Tags,
    Images,
    Addresses,
    Baskets,
    Orders,
}

pub const PRODUCT_FIELDS: [&str; 6] = ["name", "slug", "description", "price", "active", "tags"];

#[derive(Debug, Clone, Serialize)]
pub struct ReportingPage {
    pub name: &'static str,
    pub link: &'static str,
}

pub const REPORTING_PAGES: [ReportingPage; 2] = [
    ReportingPage {
        name: "Orders per day",
        link: "orders_per_day",
    },
    ReportingPage {
        name: "Most bought products",
        link: "most_bought_products",
    },
];

impl AdminSite {
    pub const ALL: [AdminSite; 3] = [
        AdminSite::Owners,
        AdminSite::CentralOffice,
        AdminSite::Dispatchers,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            AdminSite::Owners => "/admin",
            AdminSite::CentralOffice => "/office-admin",
            AdminSite::Dispatchers => "/dispatch-admin",
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            AdminSite::Owners => "BookTime owners administration",
            AdminSite::CentralOffice => "BookTime central office administration",
            AdminSite::Dispatchers => "BookTime dispatch administration",
        }
    }

    /// (site header colour, module caption colour)
    pub fn colors(&self) -> (&'static str, &'static str) {
        match self {
            AdminSite::Owners => ("black", "grey"),
            AdminSite::CentralOffice => ("purple", "pink"),
            AdminSite::Dispatchers => ("green", "lightgreen"),
        }
    }

    /// Role check only; `is_active` is enforced by the auth gate.
    pub fn has_permission(&self, user: &user::Model) -> bool {
        match self {
            AdminSite::Owners => user.is_superuser,
            AdminSite::CentralOffice => user.is_employee,
            AdminSite::Dispatchers => user.is_dispatcher,
        }
    }

    pub fn resources(&self) -> &'static [Resource] {
        use Resource::*;

        match self {
            AdminSite::Owners => &[Users, Products, Tags, Images, Addresses, Baskets, Orders],
            AdminSite::CentralOffice => &[Products, Tags, Images, Addresses, Orders],
            AdminSite::Dispatchers => &[Products, Tags, Orders],
        }
    }

    pub fn exposes(&self, resource: Resource) -> bool {
        self.resources().contains(&resource)
    }

    /// Product fields the caller sees but may not change on this site.
    pub fn read_only_product_fields(&self, is_superuser: bool) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !is_superuser {
            fields.extend(["name", "slug"]);
        }
        match self {
            AdminSite::Owners | AdminSite::CentralOffice => {
                if !is_superuser {
                    fields.extend(["price", "tags"]);
                }
            }
            AdminSite::Dispatchers => fields.extend(["description", "price", "tags", "active"]),
        }
        PRODUCT_FIELDS
            .iter()
            .copied()
            .filter(|field| fields.contains(field))
            .collect()
    }

    pub fn read_only_tag_fields(&self, is_superuser: bool) -> Vec<&'static str> {
        if is_superuser {
            Vec::new()
        } else {
            vec!["name", "slug"]
        }
    }

    /// Whether the order's owning user can be reassigned here.
    pub fn can_reassign_order_user(&self) -> bool {
        matches!(self, AdminSite::Owners)
    }

    /// Dispatchers only see orders that are paid and waiting to ship.
    pub fn restricts_orders_to_paid(&self) -> bool {
        matches!(self, AdminSite::Dispatchers)
    }

    /// Dispatch views carry shipping data only: no billing, no prices.
    pub fn shows_billing_and_prices(&self) -> bool {
        !matches!(self, AdminSite::Dispatchers)
    }
}

/// Fields from `requested` that `read_only` forbids, in request order.
pub fn blocked_fields<'a>(requested: &[&'a str], read_only: &[&str]) -> Vec<&'a str> {
    requested
        .iter()
        .copied()
        .filter(|field| read_only.contains(field))
        .collect()
}
