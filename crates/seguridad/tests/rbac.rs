// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

mod common;

use common::{FailingStore, Fixture, RecordingNotifier};
use seguridad::AccessError;
use seguridad::models::{BulkUser, EntityId, NewPermission};
use seguridad::store::EntityStore;
use std::sync::Arc;

#[tokio::test]
async fn test_duplicate_role_assignment_rejected() {
    let fx = Fixture::new();
    for i in 1..=5 {
        fx.user(&format!("User {i}"), &format!("user{i}@example.com")).await;
    }
    fx.role("viewer").await;
    let role = fx.role("editor").await;
    assert_eq!(role.id, 2);

    let first = fx.service.assign_role_to_user(5, 2).await.unwrap();
    assert_eq!((first.user_id, first.role_id), (5, 2));

    let err = fx.service.assign_role_to_user(5, 2).await.unwrap_err();
    assert!(matches!(
        err,
        AccessError::DuplicateAssignment {
            parent: "user",
            parent_id: 5,
            child: "role",
            child_id: 2
        }
    ));
    assert_eq!(err.to_string(), "role 2 is already assigned to user 5");
}

#[tokio::test]
async fn test_assignment_names_missing_entity() {
    let fx = Fixture::new();
    let user = fx.user("Ana", "ana@example.com").await;
    let role = fx.role("admin").await;

    let err = fx.service.assign_role_to_user(user.id, 99).await.unwrap_err();
    assert_eq!(err.to_string(), "role 99 not found");

    let err = fx.service.assign_role_to_user(42, role.id).await.unwrap_err();
    assert_eq!(err.to_string(), "user 42 not found");
}

#[tokio::test]
async fn test_remove_missing_pair_reports_zero_rows() {
    let fx = Fixture::new();
    let user = fx.user("Ana", "ana@example.com").await;
    let role = fx.role("admin").await;

    assert_eq!(fx.service.remove_role_from_user(user.id, role.id).await.unwrap(), 0);

    fx.assign(user.id, role.id).await;
    assert_eq!(fx.service.remove_role_from_user(user.id, role.id).await.unwrap(), 1);
    assert!(fx.service.resolver().role_names(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_effective_permissions_union_across_roles() {
    let fx = Fixture::new();
    let user = fx.user("Ana", "ana@example.com").await;
    let seguridad = fx.module("Seguridad", "SEGURIDAD").await;
    let inventario = fx.module("Inventario", "INVENTARIO").await;
    let read = fx.permission("users.read", seguridad.id).await;
    let write = fx.permission("users.write", seguridad.id).await;
    let stock = fx.permission("stock.read", inventario.id).await;
    let auditor = fx.role("auditor").await;
    let operator = fx.role("operator").await;

    fx.grant(auditor.id, read.id).await;
    fx.grant(operator.id, read.id).await;
    fx.grant(operator.id, write.id).await;
    fx.grant(operator.id, stock.id).await;
    fx.assign(user.id, auditor.id).await;
    fx.assign(user.id, operator.id).await;

    let effective = fx.service.resolve_effective_permissions(user.id).await.unwrap();
    assert_eq!(effective.permission_ids().into_iter().collect::<Vec<_>>(), vec![read.id, write.id, stock.id]);

    let modules = fx.service.resolver().accessible_module_keys(user.id).await.unwrap();
    assert_eq!(modules.into_iter().collect::<Vec<_>>(), vec!["INVENTARIO", "SEGURIDAD"]);

    assert!(fx.service.has_module_access(user.id, "INVENTARIO").await.unwrap());
    assert!(!fx.service.has_module_access(user.id, "VENTAS").await.unwrap());
    assert!(fx.service.has_module_access(user.id, "").await.unwrap());
}

#[tokio::test]
async fn test_resolve_unknown_user() {
    let fx = Fixture::new();
    let err = fx.service.resolve_effective_permissions(7).await.unwrap_err();
    assert!(matches!(err, AccessError::NotFound { entity: "user", .. }));
}

#[tokio::test]
async fn test_admin_assignment_is_audited() {
    let fx = Fixture::new();
    let admin = fx.user("Admin", "admin@example.com").await;
    let user = fx.user("Ana", "ana@example.com").await;
    let role = fx.role("auditor").await;

    fx.service.admin().assign_role_to_user(admin.id, user.id, role.id).await.unwrap();

    let records = fx.audit_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].event, "INSERT");
    assert_eq!(records[0].user_id, admin.id);
    assert_eq!(records[0].origin_service, "SEGURIDAD");
    assert!(records[0].description.contains("auditor"));

    // Duplicate attempt leaves no extra record
    assert!(fx.service.admin().assign_role_to_user(admin.id, user.id, role.id).await.is_err());
    assert_eq!(fx.audit_records().await.len(), 1);

    assert_eq!(fx.service.admin().remove_role_from_user(admin.id, user.id, role.id).await.unwrap(), 1);
    assert_eq!(fx.service.admin().remove_role_from_user(admin.id, user.id, role.id).await.unwrap(), 0);

    let records = fx.audit_records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].event, "DELETE");
}

#[tokio::test]
async fn test_permission_role_links_are_audited() {
    let fx = Fixture::new();
    let admin = fx.user("Admin", "admin@example.com").await;
    let module = fx.module("Seguridad", "SEGURIDAD").await;
    let permission = fx.permission("users.read", module.id).await;
    let role = fx.role("auditor").await;

    let link = fx.service.admin().assign_permission_to_role(admin.id, role.id, permission.id).await.unwrap();
    assert_eq!((link.role_id, link.permission_id), (role.id, permission.id));

    let err = fx.service.admin().assign_permission_to_role(admin.id, role.id, permission.id).await.unwrap_err();
    assert_eq!(err.to_string(), format!("permission {} is already assigned to role {}", permission.id, role.id));

    assert_eq!(fx.service.admin().remove_permission_from_role(admin.id, role.id, permission.id).await.unwrap(), 1);
    assert_eq!(fx.audit_records().await.len(), 2);
}

#[tokio::test]
async fn test_inactive_module_rejects_new_permissions_only() {
    let fx = Fixture::new();
    let admin = fx.user("Admin", "admin@example.com").await;
    let user = fx.user("Ana", "ana@example.com").await;
    let seguridad = fx.module("Seguridad", "SEGURIDAD").await;
    let archivo = fx.module("Archivo", "ARCHIVO").await;
    let kept = fx.permission("users.read", archivo.id).await;
    let moved = fx.permission("users.write", seguridad.id).await;
    let role = fx.role("archivista").await;
    fx.grant(role.id, kept.id).await;
    fx.assign(user.id, role.id).await;

    fx.service.admin().set_module_active(admin.id, archivo.id, false).await.unwrap();

    let err = fx.service.admin().assign_permission_to_module(admin.id, moved.id, archivo.id).await.unwrap_err();
    assert!(matches!(err, AccessError::InactiveModule { module_id } if module_id == archivo.id));
    assert_eq!(fx.store.get_permission(moved.id).await.unwrap().unwrap().module_id, seguridad.id);

    // Existing grants under the now inactive module still resolve
    assert!(fx.service.has_module_access(user.id, "ARCHIVO").await.unwrap());

    fx.service.admin().set_module_active(admin.id, archivo.id, true).await.unwrap();
    let updated = fx.service.admin().assign_permission_to_module(admin.id, moved.id, archivo.id).await.unwrap();
    assert_eq!(updated.module_id, archivo.id);
    assert_eq!(fx.store.get_permission(moved.id).await.unwrap().unwrap().module_id, archivo.id);
}

#[tokio::test]
async fn test_activation_toggles_are_audited() {
    let fx = Fixture::new();
    let admin = fx.user("Admin", "admin@example.com").await;
    let role = fx.role("auditor").await;

    let role = fx.service.admin().set_role_active(admin.id, role.id, false).await.unwrap();
    assert!(!role.active);
    assert!(!fx.store.get_role(role.id).await.unwrap().unwrap().active);

    fx.service.admin().set_role_active(admin.id, role.id, true).await.unwrap();

    let events: Vec<String> = fx.audit_records().await.into_iter().map(|r| r.event).collect();
    assert_eq!(events, vec!["DELETE", "UPDATE"]);

    let err = fx.service.admin().set_user_active(admin.id, 404, false).await.unwrap_err();
    assert!(matches!(err, AccessError::NotFound { entity: "user", .. }));
}

#[tokio::test]
async fn test_audit_failure_rolls_back_mutation() {
    let store = Arc::new(FailingStore::default());
    let fx = Fixture::with(store.clone(), Arc::new(RecordingNotifier::default()));
    let admin = fx.user("Admin", "admin@example.com").await;
    let user = fx.user("Ana", "ana@example.com").await;
    let role = fx.role("auditor").await;

    store.fail_audit_writes(true);
    let err = fx.service.admin().assign_role_to_user(admin.id, user.id, role.id).await.unwrap_err();
    assert!(matches!(err, AccessError::StorageUnavailable(_)));
    assert!(fx.store.find_user_role(user.id, role.id).await.unwrap().is_none());

    store.fail_audit_writes(false);
    fx.service.admin().assign_role_to_user(admin.id, user.id, role.id).await.unwrap();
    assert!(fx.store.find_user_role(user.id, role.id).await.unwrap().is_some());
    assert_eq!(fx.audit_records().await.len(), 1);
}

#[tokio::test]
async fn test_revoke_that_lost_a_race_reports_zero_rows() {
    let store = Arc::new(FailingStore::default());
    let fx = Fixture::with(store.clone(), Arc::new(RecordingNotifier::default()));
    let admin = fx.user("Admin", "admin@example.com").await;
    let user = fx.user("Ana", "ana@example.com").await;
    let module = fx.module("Seguridad", "SEGURIDAD").await;
    let permission = fx.permission("users.read", module.id).await;
    let role = fx.role("auditor").await;

    // The existence checks pass but the pairs are already gone at commit time
    store.serve_stale_joins(true);
    assert_eq!(fx.service.admin().remove_role_from_user(admin.id, user.id, role.id).await.unwrap(), 0);
    assert_eq!(fx.service.admin().remove_permission_from_role(admin.id, role.id, permission.id).await.unwrap(), 0);
    store.serve_stale_joins(false);

    assert!(fx.audit_records().await.is_empty());
}

fn bulk_user(name: &str, email: &str, role_id: EntityId) -> BulkUser {
    BulkUser {
        name: name.to_string(),
        email: email.to_string(),
        password: "Carga-Rapida-1".to_string(),
        active: true,
        role_id,
    }
}

#[tokio::test]
async fn test_bulk_user_load_creates_assigns_and_audits() {
    let fx = Fixture::new();
    let admin = fx.user("Admin", "admin@example.com").await;
    let role = fx.role("cajero").await;

    let created = fx
        .service
        .admin()
        .bulk_create_users(admin.id, vec![bulk_user("Luis", " luis@example.com ", role.id), bulk_user("Marta", "marta@example.com", role.id)])
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(created[0].email, "luis@example.com");
    for user in &created {
        assert_eq!(fx.service.resolver().role_names(user.id).await.unwrap(), vec!["cajero"]);
    }
    fx.service.authenticate("marta@example.com", "Carga-Rapida-1", "").await.unwrap();

    let records = fx.audit_records().await;
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.event == "INSERT" && r.user_id == admin.id));
    assert_eq!(records[0].description, "Created user luis@example.com");
    assert_eq!(records[1].description, "Assigned role cajero to user luis@example.com");
}

#[tokio::test]
async fn test_bulk_user_load_is_all_or_nothing() {
    let fx = Fixture::new();
    let admin = fx.user("Admin", "admin@example.com").await;
    fx.user("Ana", "ana@example.com").await;
    let role = fx.role("cajero").await;

    let load = vec![
        bulk_user("Luis", "luis@example.com", role.id),
        bulk_user("Ana bis", "ANA@example.com", role.id),
        bulk_user("Marta", "marta@example.com", role.id),
    ];
    let err = fx.service.admin().bulk_create_users(admin.id, load).await.unwrap_err();
    assert!(matches!(err, AccessError::AlreadyExists { entity: "user", field: "email", ref value } if value == "ANA@example.com"));

    let repeated = vec![bulk_user("Luis", "luis@example.com", role.id), bulk_user("Luis", "Luis@Example.com", role.id)];
    assert!(matches!(
        fx.service.admin().bulk_create_users(admin.id, repeated).await,
        Err(AccessError::AlreadyExists { .. })
    ));

    let unknown_role = vec![bulk_user("Luis", "luis@example.com", role.id), bulk_user("Marta", "marta@example.com", 77)];
    let err = fx.service.admin().bulk_create_users(admin.id, unknown_role).await.unwrap_err();
    assert_eq!(err.to_string(), "role 77 not found");

    assert!(fx.store.find_user_by_email("luis@example.com").await.unwrap().is_none());
    assert!(fx.store.find_user_by_email("marta@example.com").await.unwrap().is_none());
    assert!(fx.audit_records().await.is_empty());
}

#[tokio::test]
async fn test_bulk_user_load_rolls_back_when_audit_fails() {
    let store = Arc::new(FailingStore::default());
    let fx = Fixture::with(store.clone(), Arc::new(RecordingNotifier::default()));
    let admin = fx.user("Admin", "admin@example.com").await;
    let role = fx.role("cajero").await;

    store.fail_audit_writes(true);
    let err = fx
        .service
        .admin()
        .bulk_create_users(admin.id, vec![bulk_user("Luis", "luis@example.com", role.id)])
        .await
        .unwrap_err();

    assert!(matches!(err, AccessError::StorageUnavailable(_)));
    assert!(fx.store.find_user_by_email("luis@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_bulk_permission_load() {
    let fx = Fixture::new();
    let admin = fx.user("Admin", "admin@example.com").await;
    let ventas = fx.module("Ventas", "VENTAS").await;
    let archivo = fx.module("Archivo", "ARCHIVO").await;
    let permission = |name: &str, module_id: EntityId| NewPermission {
        name: name.to_string(),
        description: String::new(),
        active: true,
        module_id,
    };

    let created = fx
        .service
        .admin()
        .bulk_create_permissions(admin.id, vec![permission("sales.read", ventas.id), permission("sales.write", ventas.id)])
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(fx.store.get_permission(created[1].id).await.unwrap().unwrap().name, "sales.write");
    assert_eq!(fx.audit_records().await.len(), 2);

    fx.service.admin().set_module_active(admin.id, archivo.id, false).await.unwrap();
    let err = fx
        .service
        .admin()
        .bulk_create_permissions(admin.id, vec![permission("files.read", ventas.id), permission("files.write", archivo.id)])
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::InactiveModule { module_id } if module_id == archivo.id));
    // Two permission records and the deactivation; nothing from the rejected load
    assert_eq!(fx.audit_records().await.len(), 3);

    assert!(fx.service.admin().bulk_create_permissions(admin.id, Vec::new()).await.unwrap().is_empty());
}
