/// End-to-end scenarios over the access core
///
/// Each test builds its own in-memory database with two dioceses:
///
/// ```text
/// province 1
/// ├── diocese 3 ── archdeaconry 5 ── deanery 7 ── parishes 11, 12
/// └── diocese 9 ── archdeaconry 6 ── deanery 8 ── parish 13
/// ```
use parish_access::access::{
    Actor, AuditLog, BulkAction, DenyReason, HierarchyCatalog, PermissionEvaluator,
    RoleAssignmentService, RoleLevel, ScopeResolver,
};
use parish_access::db::{
    self,
    users::{NewUser, UserStore},
};
use parish_access::AccessError;
use sqlx::SqlitePool;

struct World {
    users: UserStore,
    evaluator: PermissionEvaluator,
    scope: ScopeResolver,
    assignments: RoleAssignmentService,
    audit: AuditLog,
}

async fn world() -> World {
    let pool = seeded().await;
    let users = UserStore::new(pool.clone());

    World {
        evaluator: PermissionEvaluator::new(users.clone()),
        scope: ScopeResolver::new(users.clone(), HierarchyCatalog::new(pool.clone())),
        assignments: RoleAssignmentService::new(pool.clone(), 50),
        audit: AuditLog::new(pool),
        users,
    }
}

async fn seeded() -> SqlitePool {
    let pool = db::memory_pool().await.unwrap();

    for sql in [
        "INSERT INTO provinces (id, name) VALUES (1, 'Province')",
        "INSERT INTO dioceses (id, name, province_id) VALUES (3, 'Diocese A', 1), (9, 'Diocese B', 1)",
        "INSERT INTO archdeaconries (id, name, diocese_id) VALUES (5, 'Arch A', 3), (6, 'Arch B', 9)",
        "INSERT INTO deaneries (id, name, archdeaconry_id) VALUES (7, 'Deanery A', 5), (8, 'Deanery B', 6)",
        "INSERT INTO parishes (id, name, deanery_id) VALUES (11, 'Parish A1', 7), (12, 'Parish A2', 7), (13, 'Parish B1', 8)",
    ] {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }

    pool
}

async fn user(world: &World, name: &str, role: RoleLevel, parish_id: i64) -> Actor {
    let (deanery, archdeaconry, diocese) = if parish_id == 13 { (8, 6, 9) } else { (7, 5, 3) };

    let id = world
        .users
        .insert_user(NewUser {
            name: name.to_string(),
            email: None,
            role_level: Some(role),
            province_id: Some(1),
            diocese_id: Some(diocese),
            archdeaconry_id: Some(archdeaconry),
            deanery_id: Some(deanery),
            parish_id: Some(parish_id),
        })
        .await
        .unwrap();

    Actor::from_user(&world.users.get_user(id).await.unwrap())
}

#[tokio::test]
async fn deanery_admin_promotes_member_in_deanery() {
    let world = world().await;
    let admin = user(&world, "A", RoleLevel::DeaneryAdmin, 11).await;
    let target = user(&world, "U", RoleLevel::Member, 12).await;
    assert_eq!(admin.anchor_id, Some(7));

    let assignment = world
        .assignments
        .assign_role(&admin, target.user_id, "parish_admin")
        .await
        .unwrap();
    assert_eq!(assignment.previous_role, RoleLevel::Member);
    assert_eq!(assignment.new_role, RoleLevel::ParishAdmin);

    let stored = world.users.get_user(target.user_id).await.unwrap();
    assert_eq!(stored.role_level, RoleLevel::ParishAdmin);
    assert!(stored.force_logout);

    let entries = world.audit.list_for_target(target.user_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "ROLE_CHANGE");
    assert_eq!(entries[0].old_value.as_deref(), Some("member"));
    assert_eq!(entries[0].new_value.as_deref(), Some("parish_admin"));
}

#[tokio::test]
async fn parish_admin_cannot_promote_self() {
    let world = world().await;
    let b = user(&world, "B", RoleLevel::ParishAdmin, 11).await;

    let err = world
        .assignments
        .assign_role(&b, b.user_id, "diocese_admin")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AccessError::PermissionDenied(DenyReason::SelfModification)
    ));
    assert_eq!(err.reason(), "no permission: self-modification");

    let stored = world.users.get_user(b.user_id).await.unwrap();
    assert_eq!(stored.role_level, RoleLevel::ParishAdmin);
    assert!(!stored.force_logout);

    let entries = world.audit.list_for_target(b.user_id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].action.ends_with("_DENIED"));
}

#[tokio::test]
async fn diocese_admin_cannot_reach_other_diocese() {
    let world = world().await;
    let c = user(&world, "C", RoleLevel::DioceseAdmin, 11).await;
    let v = user(&world, "V", RoleLevel::Member, 13).await;
    assert_eq!(c.anchor_id, Some(3));

    let err = world
        .assignments
        .assign_role(&c, v.user_id, "parish_admin")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PermissionDenied(DenyReason::OutOfScope)));
    assert_eq!(err.reason(), "no permission: out of scope");
}

#[tokio::test]
async fn national_admin_cannot_grant_super_admin() {
    let world = world().await;
    let d = user(&world, "D", RoleLevel::NationalAdmin, 11).await;
    let w = user(&world, "W", RoleLevel::Member, 13).await;

    assert!(!world
        .evaluator
        .can_assign_role(&d, w.user_id, RoleLevel::SuperAdmin)
        .await
        .unwrap());

    let err = world
        .assignments
        .assign_role(&d, w.user_id, "super_admin")
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::PermissionDenied(DenyReason::TopTierGrant)));
    assert_eq!(
        world.users.get_user(w.user_id).await.unwrap().role_level,
        RoleLevel::Member
    );
}

#[tokio::test]
async fn repeated_assignment_is_logged_again() {
    let world = world().await;
    let admin = user(&world, "A", RoleLevel::DeaneryAdmin, 11).await;
    let target = user(&world, "U", RoleLevel::Member, 12).await;

    world
        .assignments
        .assign_role(&admin, target.user_id, "parish_admin")
        .await
        .unwrap();
    let second = world
        .assignments
        .assign_role(&admin, target.user_id, "parish_admin")
        .await
        .unwrap();

    assert_eq!(second.previous_role, RoleLevel::ParishAdmin);
    assert_eq!(second.new_role, RoleLevel::ParishAdmin);
    assert_eq!(world.audit.list_for_target(target.user_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn bulk_continues_past_failures() {
    let world = world().await;
    let root = user(&world, "Root", RoleLevel::SuperAdmin, 11).await;
    let actor = user(&world, "Admin", RoleLevel::NationalAdmin, 11).await;
    let a = user(&world, "A", RoleLevel::Member, 11).await;
    let b = user(&world, "B", RoleLevel::Member, 12).await;
    let c = user(&world, "C", RoleLevel::Member, 13).await;

    let ids = [a.user_id, actor.user_id, b.user_id, root.user_id, c.user_id];
    let outcome = world
        .assignments
        .bulk_assign(&actor, &ids, BulkAction::AssignRole("parish_admin".to_string()))
        .await
        .unwrap();

    assert!(outcome.processed_count <= 3);
    assert!(outcome.failed_count >= 2);
    assert_eq!(outcome.processed_count + outcome.failed_count, 5);
    assert_eq!(outcome.items.len(), 5);

    let self_item = &outcome.items[1];
    assert!(!self_item.success);
    assert_eq!(self_item.reason.as_deref(), Some("no permission: self-modification"));

    let super_item = &outcome.items[3];
    assert!(!super_item.success);
    assert!(super_item.reason.is_some());
}

#[tokio::test]
async fn member_scope_is_empty() {
    let world = world().await;
    let member = user(&world, "M", RoleLevel::Member, 11).await;
    user(&world, "Other", RoleLevel::Member, 11).await;

    assert!(world.scope.accessible_user_ids(&member).await.unwrap().is_empty());
    assert!(!world.evaluator.can_view(&member, member.user_id + 1).await.unwrap());
}

#[tokio::test]
async fn super_admin_reaches_everyone_but_super_admins() {
    let world = world().await;
    let root = user(&world, "Root", RoleLevel::SuperAdmin, 11).await;
    let other_root = user(&world, "Root Two", RoleLevel::SuperAdmin, 13).await;
    let far = user(&world, "Far", RoleLevel::DioceseAdmin, 13).await;

    assert!(world.evaluator.can_edit(&root, far.user_id).await.unwrap());
    assert!(world.evaluator.can_view(&root, far.user_id).await.unwrap());
    assert!(world
        .evaluator
        .can_assign_role(&root, far.user_id, RoleLevel::NationalAdmin)
        .await
        .unwrap());

    assert!(!world.evaluator.can_edit(&root, other_root.user_id).await.unwrap());
    assert!(!world
        .evaluator
        .can_assign_role(&root, other_root.user_id, RoleLevel::Member)
        .await
        .unwrap());
    assert!(!world.evaluator.can_delete(&root, root.user_id).await.unwrap());
}
