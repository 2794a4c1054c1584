//! Permission Catalog: the static registry of valid permission strings.
//!
//! The catalog validates grants at write time (invitation/membership updates).
//! It never takes part in an allow/deny decision.

use serde::Serialize;

use crate::{MembershipRole, Permission, PermissionSet};

pub const ORDERS_READ: Permission = Permission::from_static("orders:read");
pub const ORDERS_WRITE: Permission = Permission::from_static("orders:write");
pub const CLIENTS_READ: Permission = Permission::from_static("clients:read");
pub const CLIENTS_WRITE: Permission = Permission::from_static("clients:write");
pub const MEASUREMENTS_READ: Permission = Permission::from_static("measurements:read");
pub const MEASUREMENTS_WRITE: Permission = Permission::from_static("measurements:write");
pub const MEASUREMENTS_SYNC: Permission = Permission::from_static("measurements:sync");
pub const PAYMENTS_READ: Permission = Permission::from_static("payments:read");
pub const PAYMENTS_WRITE: Permission = Permission::from_static("payments:write");
pub const INVOICES_READ: Permission = Permission::from_static("invoices:read");
pub const INVOICES_WRITE: Permission = Permission::from_static("invoices:write");
pub const INVENTORY_READ: Permission = Permission::from_static("inventory:read");
pub const INVENTORY_WRITE: Permission = Permission::from_static("inventory:write");
pub const REPORTS_READ: Permission = Permission::from_static("reports:read");
pub const WORKERS_MANAGE: Permission = Permission::from_static("workers:manage");

/// Every valid permission.
pub const ALL: &[Permission] = &[
    ORDERS_READ,
    ORDERS_WRITE,
    CLIENTS_READ,
    CLIENTS_WRITE,
    MEASUREMENTS_READ,
    MEASUREMENTS_WRITE,
    MEASUREMENTS_SYNC,
    PAYMENTS_READ,
    PAYMENTS_WRITE,
    INVOICES_READ,
    INVOICES_WRITE,
    INVENTORY_READ,
    INVENTORY_WRITE,
    REPORTS_READ,
    WORKERS_MANAGE,
];

/// Catalog entry for a resource (for display/audit).
#[derive(Debug, Clone, Serialize)]
pub struct ResourceEntry {
    pub resource: String,
    pub actions: Vec<String>,
    pub description: &'static str,
}

/// Role definition with its default permissions (for display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefaults {
    pub role: MembershipRole,
    pub permissions: Vec<String>,
    pub unrestricted: bool,
}

pub(crate) fn lookup(resource: &str, action: &str) -> Option<Permission> {
    ALL.iter()
        .find(|p| p.resource() == resource && p.action() == action)
        .cloned()
}

/// Resources grouped with their valid actions.
pub fn resources() -> Vec<ResourceEntry> {
    let mut out: Vec<ResourceEntry> = Vec::new();
    for permission in ALL {
        match out.iter_mut().find(|e| e.resource == permission.resource()) {
            Some(entry) => entry.actions.push(permission.action().to_string()),
            None => out.push(ResourceEntry {
                resource: permission.resource().to_string(),
                actions: vec![permission.action().to_string()],
                description: resource_description(permission.resource()),
            }),
        }
    }
    out
}

fn resource_description(resource: &str) -> &'static str {
    match resource {
        "orders" => "Customer orders and their production status",
        "clients" => "Client directory and contact details",
        "measurements" => "Client body measurements (sync covers offline devices)",
        "payments" => "Deposits and payments received",
        "invoices" => "Invoices issued to clients",
        "inventory" => "Fabric and material stock",
        "reports" => "Business reports and summaries",
        "workers" => "Inviting and managing organization members",
        _ => "",
    }
}

/// Permissions a role implies by default.
///
/// Managers are unrestricted inside their organization (the evaluator allows
/// them without consulting grants); workers start with nothing and receive
/// explicit grants.
pub fn role_defaults(role: MembershipRole) -> PermissionSet {
    match role {
        MembershipRole::Manager => ALL.iter().cloned().collect(),
        MembershipRole::Worker => PermissionSet::new(),
    }
}

pub fn all_role_defaults() -> Vec<RoleDefaults> {
    [MembershipRole::Manager, MembershipRole::Worker]
        .into_iter()
        .map(|role| RoleDefaults {
            role,
            permissions: role_defaults(role).to_strings(),
            unrestricted: role.is_manager(),
        })
        .collect()
}
