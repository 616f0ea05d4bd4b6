//! Pure access decisions. Handlers resolve the resource first (absence is a
//! 404), then ask here whether the principal may touch it (403). Nothing in
//! this module talks to the database.

use uuid::Uuid;

use crate::auth::{AuthenticatedUser, Role};
use crate::error::{AppError, AppResult};
use crate::models::Order;

/// Ownership slice of an order, enough to decide access without dragging the
/// whole row around.
#[derive(Debug, Clone, Copy)]
pub struct OrderParties {
    pub client_id: Uuid,
    pub engineer_id: Option<Uuid>,
}

impl From<&Order> for OrderParties {
    fn from(order: &Order) -> Self {
        Self {
            client_id: order.client_id,
            engineer_id: order.engineer_id,
        }
    }
}

/// Whether the principal may read or act on an order and everything scoped
/// to it (plans, revision requests, messages).
///
/// Engineers see unclaimed orders so they can pick them up; once a claim
/// binds `engineer_id`, only that engineer keeps access.
pub fn can_access_order(user: &AuthenticatedUser, order: OrderParties) -> bool {
    match user.role {
        Role::Admin => true,
        Role::Client => order.client_id == user.user_id,
        Role::Engineer => match order.engineer_id {
            Some(engineer_id) => engineer_id == user.user_id,
            None => true,
        },
    }
}

pub fn ensure_order_access(user: &AuthenticatedUser, order: &Order) -> AppResult<()> {
    if can_access_order(user, order.into()) {
        Ok(())
    } else {
        Err(AppError::forbidden())
    }
}

pub fn ensure_admin(user: &AuthenticatedUser) -> AppResult<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Client | Role::Engineer => Err(AppError::forbidden()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            name: "test".to_string(),
            role,
        }
    }

    fn parties(client_id: Uuid, engineer_id: Option<Uuid>) -> OrderParties {
        OrderParties {
            client_id,
            engineer_id,
        }
    }

    #[test]
    fn admin_accesses_every_order() {
        let admin = principal(Role::Admin);
        assert!(can_access_order(
            &admin,
            parties(Uuid::new_v4(), Some(Uuid::new_v4()))
        ));
        assert!(can_access_order(&admin, parties(Uuid::new_v4(), None)));
    }

    #[test]
    fn client_accesses_only_own_orders() {
        let client = principal(Role::Client);
        assert!(can_access_order(
            &client,
            parties(client.user_id, Some(Uuid::new_v4()))
        ));
        assert!(!can_access_order(
            &client,
            parties(Uuid::new_v4(), Some(client.user_id))
        ));
    }

    #[test]
    fn engineer_accesses_bound_and_unclaimed_orders() {
        let engineer = principal(Role::Engineer);
        assert!(can_access_order(
            &engineer,
            parties(Uuid::new_v4(), Some(engineer.user_id))
        ));
        assert!(can_access_order(&engineer, parties(Uuid::new_v4(), None)));
        assert!(!can_access_order(
            &engineer,
            parties(Uuid::new_v4(), Some(Uuid::new_v4()))
        ));
    }

    #[test]
    fn admin_gate_rejects_other_roles() {
        assert!(ensure_admin(&principal(Role::Admin)).is_ok());
        assert!(ensure_admin(&principal(Role::Client)).is_err());
        assert!(ensure_admin(&principal(Role::Engineer)).is_err());
    }
}
