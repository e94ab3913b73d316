/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Per-entity repository behaviour against a migrated SQLite file.

use std::collections::HashSet;
use std::thread::JoinHandle;
use std::time::Duration;

use badgestore::models::{
    BadgeClassPatch, IssuerPatch, NewPlatform, NewStatusList, NewUserAssertion, PlatformPatch,
    PlatformStatus, StatusListPatch, StatusPurpose, UserAssertionStatus,
};
use badgestore::{DatabaseError, EntityType, Pagination, ValidationError};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use serde_json::json;
use tracing_test::traced_test;

use crate::fixtures::{
    initialized_fixture, sample_assertion, sample_badge_class, sample_issuer, SqliteFixture,
};

const MISSING_ID: &str = "urn:uuid:00000000-0000-4000-8000-000000000000";

async fn seeded_assertion(fixture: &SqliteFixture) -> (String, String, String) {
    let dal = fixture.service.dal();
    let issuer = dal
        .issuer()
        .create(sample_issuer("Seed Academy"))
        .await
        .expect("Failed to create issuer");
    let badge = dal
        .badge_class()
        .create(sample_badge_class(&issuer.id, "Seed Badge"))
        .await
        .expect("Failed to create badge class");
    let assertion = dal
        .assertion()
        .create(sample_assertion(&badge.id, "learner@example.org"))
        .await
        .expect("Failed to create assertion");
    (issuer.id, badge.id, assertion.id)
}

/// Opens a second connection, takes the write lock with `statement`
/// uncommitted, and commits after `hold` on a background thread.
fn hold_write_lock(fixture: &SqliteFixture, statement: &str, hold: Duration) -> JoinHandle<()> {
    let mut raw = fixture.raw_connection();
    raw.batch_execute("BEGIN IMMEDIATE")
        .expect("Failed to take write lock");
    raw.batch_execute(statement)
        .expect("Failed to write under lock");
    std::thread::spawn(move || {
        std::thread::sleep(hold);
        raw.batch_execute("COMMIT")
            .expect("Failed to release write lock");
    })
}

mod issuers {
    use super::*;

    #[tokio::test]
    async fn test_create_read_update_delete() {
        let fixture = initialized_fixture().await;
        let issuers = fixture.service.dal().issuer();

        let created = issuers
            .create(sample_issuer("Open University"))
            .await
            .expect("Failed to create issuer");
        assert!(created.id.starts_with("urn:uuid:"));
        assert_eq!(created.email.as_deref(), Some("badges@example.edu"));
        assert_eq!(created.additional_fields, json!({}));

        let found = issuers
            .find_by_id(&created.id)
            .await
            .expect("Failed to find issuer");
        assert_eq!(found.as_ref(), Some(&created));

        let updated = issuers
            .update(
                &created.id,
                IssuerPatch {
                    name: Some("Open University of Badges".to_string()),
                    email: Some(None),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to update issuer")
            .expect("Issuer vanished during update");
        assert_eq!(updated.name, "Open University of Badges");
        assert_eq!(updated.email, None);
        assert_eq!(updated.url, created.url);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        assert!(issuers.delete(&created.id).await.expect("Failed to delete"));
        assert!(!issuers.delete(&created.id).await.expect("Failed to re-delete"));
        assert_eq!(issuers.find_by_id(&created.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_caller_supplied_identifier_is_kept() {
        let fixture = initialized_fixture().await;
        let mut new_issuer = sample_issuer("Named Issuer");
        new_issuer.id = Some("https://issuer.example.edu/issuers/1".to_string());

        let created = fixture
            .service
            .dal()
            .issuer()
            .create(new_issuer.clone())
            .await
            .expect("Failed to create issuer");
        assert_eq!(created.id, "https://issuer.example.edu/issuers/1");

        let err = fixture
            .service
            .dal()
            .issuer()
            .create(new_issuer)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(), "{err:?}");
    }

    #[tokio::test]
    async fn test_update_of_missing_issuer_returns_none() {
        let fixture = initialized_fixture().await;
        let result = fixture
            .service
            .dal()
            .issuer()
            .update(
                MISSING_ID,
                IssuerPatch {
                    name: Some("Nobody".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update of a missing row is not an error");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_update_waits_for_concurrent_writer() {
        let fixture = initialized_fixture().await;
        let issuers = fixture.service.dal().issuer();
        let target = issuers
            .create(sample_issuer("Contended College"))
            .await
            .unwrap();
        let other = issuers.create(sample_issuer("Busy Bureau")).await.unwrap();

        let writer = hold_write_lock(
            &fixture,
            &format!(
                "UPDATE issuers SET name = 'Busy Bureau II' WHERE id = '{}'",
                other.id
            ),
            Duration::from_millis(300),
        );

        let updated = issuers
            .update(
                &target.id,
                IssuerPatch {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("update must wait for the lock instead of failing");
        writer.join().expect("writer thread panicked");

        assert_eq!(updated.map(|issuer| issuer.name).as_deref(), Some("Renamed"));
        let other = issuers.find_by_id(&other.id).await.unwrap().unwrap();
        assert_eq!(other.name, "Busy Bureau II");
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_rejected_before_io() {
        let fixture = initialized_fixture().await;
        let err = fixture
            .service
            .dal()
            .issuer()
            .find_by_id("not an identifier")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Validation(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_by_url_returns_oldest_match() {
        let fixture = initialized_fixture().await;
        let issuers = fixture.service.dal().issuer();
        let first = issuers.create(sample_issuer("First")).await.unwrap();
        // Timestamps have millisecond resolution.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        issuers.create(sample_issuer("Second")).await.unwrap();

        let found = issuers
            .find_by_url("https://issuer.example.edu")
            .await
            .expect("Failed to look up by url")
            .expect("No issuer found by url");
        assert_eq!(found.id, first.id);

        assert_eq!(
            issuers.find_by_url("https://elsewhere.example.org").await.unwrap(),
            None
        );
        assert!(matches!(
            issuers.find_by_url("   ").await,
            Err(DatabaseError::Validation(ValidationError::MissingField("url")))
        ));
    }

    #[tokio::test]
    async fn test_pages_cover_every_row_once() {
        let fixture = initialized_fixture().await;
        let issuers = fixture.service.dal().issuer();
        for i in 0..5 {
            issuers
                .create(sample_issuer(&format!("Issuer {}", i)))
                .await
                .unwrap();
        }

        let mut seen = HashSet::new();
        let mut sizes = Vec::new();
        for page in 0..3 {
            let rows = issuers
                .find_all(Pagination::page(page, 2).unwrap())
                .await
                .expect("Failed to list page");
            sizes.push(rows.len());
            for row in rows {
                assert!(seen.insert(row.id), "row appeared on two pages");
            }
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(seen.len(), 5);

        let err = issuers
            .find_all(Pagination {
                limit: 0,
                offset: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Validation(ValidationError::InvalidPagination { .. })
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unbounded_scan_warns_every_call() {
        let fixture = initialized_fixture().await;
        let issuers = fixture.service.dal().issuer();
        issuers.create(sample_issuer("Only One")).await.unwrap();

        let all = issuers.find_all_unbounded().await.unwrap();
        assert_eq!(all.len(), 1);
        issuers.find_all_unbounded().await.unwrap();

        logs_assert(|lines: &[&str]| {
            let warnings = lines
                .iter()
                .filter(|line| line.contains("Unbounded scan requested"))
                .count();
            if warnings == 2 {
                Ok(())
            } else {
                Err(format!("expected 2 unbounded-scan warnings, found {}", warnings))
            }
        });
    }
}

mod badge_classes {
    use super::*;

    #[tokio::test]
    async fn test_missing_issuer_is_reported() {
        let fixture = initialized_fixture().await;
        let err = fixture
            .service
            .dal()
            .badge_class()
            .create(sample_badge_class(MISSING_ID, "Orphan"))
            .await
            .unwrap_err();
        match err {
            DatabaseError::MissingParent { entity, id } => {
                assert_eq!(entity, EntityType::Issuer);
                assert_eq!(id, MISSING_ID);
            }
            other => panic!("expected MissingParent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_by_issuer_and_update_tags() {
        let fixture = initialized_fixture().await;
        let dal = fixture.service.dal();
        let issuer = dal.issuer().create(sample_issuer("Tagging")).await.unwrap();
        let other = dal.issuer().create(sample_issuer("Other")).await.unwrap();
        let first = dal
            .badge_class()
            .create(sample_badge_class(&issuer.id, "Rust Basics"))
            .await
            .unwrap();
        dal.badge_class()
            .create(sample_badge_class(&issuer.id, "Rust Advanced"))
            .await
            .unwrap();
        dal.badge_class()
            .create(sample_badge_class(&other.id, "Unrelated"))
            .await
            .unwrap();

        let owned = dal.badge_class().find_by_issuer(&issuer.id).await.unwrap();
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|b| b.issuer_id == issuer.id));
        assert_eq!(first.tags, vec!["course".to_string()]);
        assert_eq!(first.criteria, json!({"narrative": "Complete the course"}));

        let updated = dal
            .badge_class()
            .update(
                &first.id,
                BadgeClassPatch {
                    tags: Some(vec!["rust".to_string(), "systems".to_string()]),
                    alignment: Some(Some(json!([{"targetName": "Ownership"}]))),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.tags, vec!["rust".to_string(), "systems".to_string()]);
        assert_eq!(updated.name, "Rust Basics");
        assert!(updated.alignment.is_some());
    }
}

mod assertions {
    use super::*;

    #[tokio::test]
    async fn test_missing_badge_class_is_reported() {
        let fixture = initialized_fixture().await;
        let err = fixture
            .service
            .dal()
            .assertion()
            .create(sample_assertion(MISSING_ID, "ghost@example.org"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::MissingParent {
                entity: EntityType::BadgeClass,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_revoke_sets_flag_and_reason() {
        let fixture = initialized_fixture().await;
        let (_, badge_id, assertion_id) = seeded_assertion(&fixture).await;
        let assertions = fixture.service.dal().assertion();

        let before = assertions.find_by_id(&assertion_id).await.unwrap().unwrap();
        assert!(!before.revoked);

        let revoked = assertions
            .revoke(&assertion_id, Some("Issued in error".to_string()))
            .await
            .expect("Failed to revoke")
            .expect("Assertion vanished during revoke");
        assert!(revoked.revoked);
        assert_eq!(revoked.revocation_reason.as_deref(), Some("Issued in error"));
        assert_eq!(revoked.recipient, before.recipient);

        let listed = assertions.find_by_badge_class(&badge_id).await.unwrap();
        assert_eq!(listed, vec![revoked]);

        assert_eq!(assertions.revoke(MISSING_ID, None).await.unwrap(), None);
    }
}

mod platforms {
    use super::*;

    fn sample_platform(name: &str, client_id: &str) -> NewPlatform {
        NewPlatform::new(name, client_id, "-----BEGIN PUBLIC KEY-----test-----END PUBLIC KEY-----")
    }

    #[tokio::test]
    async fn test_client_id_is_unique_on_create_and_update() {
        let fixture = initialized_fixture().await;
        let platforms = fixture.service.dal().platform();

        let lms = platforms
            .create(sample_platform("Campus LMS", "lms-client"))
            .await
            .unwrap();
        let portal = platforms
            .create(sample_platform("Career Portal", "portal-client"))
            .await
            .unwrap();
        assert_eq!(lms.status, PlatformStatus::Active);

        let err = platforms
            .create(sample_platform("Copycat", "lms-client"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateClientId(ref id) if id == "lms-client"));

        let err = platforms
            .update(
                &portal.id,
                PlatformPatch {
                    client_id: Some("lms-client".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateClientId(_)));

        // Re-asserting its own client id is not a clash.
        let same = platforms
            .update(
                &lms.id,
                PlatformPatch {
                    client_id: Some("lms-client".to_string()),
                    status: Some(PlatformStatus::Suspended),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(same.status, PlatformStatus::Suspended);

        let by_client = platforms
            .find_by_client_id("portal-client")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_client.id, portal.id);
    }

    #[tokio::test]
    async fn test_corrupt_row_surfaces_conversion_error() {
        let fixture = initialized_fixture().await;
        let platform = fixture
            .service
            .dal()
            .platform()
            .create(sample_platform("Legacy", "legacy-client"))
            .await
            .unwrap();

        let mut raw = fixture.raw_connection();
        diesel::sql_query("UPDATE platforms SET status = 'banished' WHERE id = ?")
            .bind::<diesel::sql_types::Text, _>(platform.id.clone())
            .execute(&mut raw)
            .expect("Failed to corrupt row");

        let err = fixture
            .service
            .dal()
            .platform()
            .find_by_id(&platform.id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Conversion {
                entity: EntityType::Platform,
                ..
            }
        ));
    }
}

mod user_assertions {
    use super::*;

    #[tokio::test]
    async fn test_backpack_entries() {
        let fixture = initialized_fixture().await;
        let (_, _, assertion_id) = seeded_assertion(&fixture).await;
        let backpack = fixture.service.dal().user_assertion();

        let entry = backpack
            .create(NewUserAssertion::new("user-42", &assertion_id))
            .await
            .expect("Failed to add to backpack");
        assert_eq!(entry.status, UserAssertionStatus::Active);

        let err = backpack
            .create(NewUserAssertion::new("user-42", &assertion_id))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(), "{err:?}");

        let hidden = backpack
            .update_status(&entry.id, UserAssertionStatus::Hidden)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hidden.status, UserAssertionStatus::Hidden);

        let held = backpack.find_by_user("user-42").await.unwrap();
        assert_eq!(held, vec![hidden.clone()]);
        assert_eq!(
            backpack
                .find_by_user_and_assertion("user-42", &assertion_id)
                .await
                .unwrap(),
            Some(hidden)
        );
        assert!(backpack.find_by_user("user-7").await.unwrap().is_empty());

        let err = backpack
            .create(NewUserAssertion::new("user-42", MISSING_ID))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::MissingParent {
                entity: EntityType::Assertion,
                ..
            }
        ));
    }
}

mod status_lists {
    use super::*;

    #[tokio::test]
    async fn test_allocation_stops_at_capacity() {
        let fixture = initialized_fixture().await;
        let (issuer_id, _, _) = seeded_assertion(&fixture).await;
        let lists = fixture.service.dal().status_list();

        let list = lists
            .create(NewStatusList::new(
                &issuer_id,
                StatusPurpose::Revocation,
                "H4sIAAAAAAAA",
                4,
            ))
            .await
            .expect("Failed to create status list");
        assert_eq!(list.used_entries, 0);
        assert_eq!(list.available_entries(), 4);

        let after = lists.record_allocation(&list.id, 3).await.unwrap().unwrap();
        assert_eq!(after.used_entries, 3);
        assert_eq!(after.available_entries(), 1);

        let err = lists.record_allocation(&list.id, 2).await.unwrap_err();
        match err {
            DatabaseError::StatusListExhausted { id, used, total } => {
                assert_eq!(id, list.id);
                assert_eq!(used, 3);
                assert_eq!(total, 4);
            }
            other => panic!("expected StatusListExhausted, got {other:?}"),
        }

        assert!(matches!(
            lists.record_allocation(&list.id, 0).await,
            Err(DatabaseError::Validation(ValidationError::InvalidField {
                field: "count",
                ..
            }))
        ));
        assert_eq!(lists.record_allocation(MISSING_ID, 1).await.unwrap(), None);

        let unchanged = lists.find_by_id(&list.id).await.unwrap().unwrap();
        assert_eq!(unchanged.used_entries, 3);
    }

    #[tokio::test]
    async fn test_allocation_sees_concurrent_allocation() {
        let fixture = initialized_fixture().await;
        let (issuer_id, _, _) = seeded_assertion(&fixture).await;
        let lists = fixture.service.dal().status_list();
        let list = lists
            .create(NewStatusList::new(
                &issuer_id,
                StatusPurpose::Suspension,
                "H4sIAAAAAAAA",
                8,
            ))
            .await
            .unwrap();

        let writer = hold_write_lock(
            &fixture,
            &format!(
                "UPDATE status_lists SET used_entries = used_entries + 2 WHERE id = '{}'",
                list.id
            ),
            Duration::from_millis(300),
        );

        let after = lists
            .record_allocation(&list.id, 1)
            .await
            .expect("allocation must wait for the lock instead of failing")
            .unwrap();
        writer.join().expect("writer thread panicked");

        // Neither allocation is lost.
        assert_eq!(after.used_entries, 3);
        assert_eq!(after.available_entries(), 5);
    }

    #[tokio::test]
    async fn test_find_by_issuer_filters_purpose() {
        let fixture = initialized_fixture().await;
        let (issuer_id, _, _) = seeded_assertion(&fixture).await;
        let lists = fixture.service.dal().status_list();

        lists
            .create(NewStatusList::new(&issuer_id, StatusPurpose::Revocation, "AAAA", 8))
            .await
            .unwrap();
        let suspension = lists
            .create(NewStatusList::new(&issuer_id, StatusPurpose::Suspension, "AAAA", 8))
            .await
            .unwrap();

        assert_eq!(lists.find_by_issuer(&issuer_id, None).await.unwrap().len(), 2);
        let filtered = lists
            .find_by_issuer(&issuer_id, Some(StatusPurpose::Suspension))
            .await
            .unwrap();
        assert_eq!(filtered, vec![suspension.clone()]);

        let refreshed = lists
            .update(
                &suspension.id,
                StatusListPatch {
                    encoded_list: Some("BBBB".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refreshed.encoded_list, "BBBB");
        assert_eq!(refreshed.total_entries, 8);
    }
}
