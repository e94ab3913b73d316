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

//! Multi-entity transactions: ecosystem creation, cascade delete, health.

use badgestore::database::generate_id;
use badgestore::models::{NewStatusList, NewUserAssertion, StatusPurpose};
use badgestore::{
    CascadeDeleteResult, ConnectionState, DatabaseError, EntityType, ValidationError,
};
use diesel::connection::SimpleConnection;

use crate::fixtures::{
    initialized_fixture, sample_assertion, sample_badge_class, sample_issuer, SqliteFixture,
};

/// Issuer with two badge classes, three assertions, two status lists and
/// one backpack entry. Returns the issuer id.
async fn populated_issuer(fixture: &SqliteFixture, name: &str) -> String {
    let dal = fixture.service.dal();
    let issuer = dal.issuer().create(sample_issuer(name)).await.unwrap();

    let intro = dal
        .badge_class()
        .create(sample_badge_class(&issuer.id, "Intro"))
        .await
        .unwrap();
    let expert = dal
        .badge_class()
        .create(sample_badge_class(&issuer.id, "Expert"))
        .await
        .unwrap();

    let first = dal
        .assertion()
        .create(sample_assertion(&intro.id, "ada@example.org"))
        .await
        .unwrap();
    dal.assertion()
        .create(sample_assertion(&intro.id, "grace@example.org"))
        .await
        .unwrap();
    dal.assertion()
        .create(sample_assertion(&expert.id, "ada@example.org"))
        .await
        .unwrap();

    for purpose in [StatusPurpose::Revocation, StatusPurpose::Suspension] {
        dal.status_list()
            .create(NewStatusList::new(&issuer.id, purpose, "H4sIAAAAAAAA", 16))
            .await
            .unwrap();
    }

    dal.user_assertion()
        .create(NewUserAssertion::new("ada", &first.id))
        .await
        .unwrap();

    issuer.id
}

mod cascade_delete {
    use super::*;

    #[tokio::test]
    async fn test_counts_dependents_and_removes_them() {
        let fixture = initialized_fixture().await;
        let doomed = populated_issuer(&fixture, "Doomed Institute").await;
        let survivor = populated_issuer(&fixture, "Surviving College").await;
        let dal = fixture.service.dal();

        let mut badge_class_ids = Vec::new();
        let mut assertion_ids = Vec::new();
        for badge in dal.badge_class().find_by_issuer(&doomed).await.unwrap() {
            for assertion in dal.assertion().find_by_badge_class(&badge.id).await.unwrap() {
                assertion_ids.push(assertion.id);
            }
            badge_class_ids.push(badge.id);
        }
        assert_eq!(badge_class_ids.len(), 2);
        assert_eq!(assertion_ids.len(), 3);

        let result = fixture
            .service
            .coordinator()
            .delete_issuer_cascade(&doomed)
            .await
            .expect("Cascade delete failed");
        assert_eq!(
            result,
            CascadeDeleteResult {
                issuer_deleted: true,
                badge_classes_deleted: 2,
                assertions_deleted: 3,
                status_lists_deleted: 2,
            }
        );

        assert_eq!(dal.issuer().find_by_id(&doomed).await.unwrap(), None);
        for id in &badge_class_ids {
            assert_eq!(dal.badge_class().find_by_id(id).await.unwrap(), None);
        }
        for id in &assertion_ids {
            assert_eq!(dal.assertion().find_by_id(id).await.unwrap(), None);
        }
        assert!(dal.badge_class().find_by_issuer(&doomed).await.unwrap().is_empty());
        assert!(dal.status_list().find_by_issuer(&doomed, None).await.unwrap().is_empty());

        // Only the survivor's rows remain.
        assert_eq!(dal.badge_class().find_all_unbounded().await.unwrap().len(), 2);
        assert_eq!(dal.assertion().find_all_unbounded().await.unwrap().len(), 3);
        let backpack = dal.user_assertion().find_by_user("ada").await.unwrap();
        assert_eq!(backpack.len(), 1);
        assert!(dal.issuer().find_by_id(&survivor).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_issuer_with_many_badge_classes() {
        let fixture = initialized_fixture().await;
        let issuer_id = populated_issuer(&fixture, "Sprawling Polytechnic").await;

        {
            let mut raw = fixture.raw_connection();
            raw.batch_execute(&format!(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 40000) \
                 INSERT INTO badge_classes \
                 (id, issuer_id, name, description, created_at, updated_at) \
                 SELECT 'urn:bulk:' || i, '{}', 'Bulk ' || i, 'Bulk badge', 0, 0 FROM n;",
                issuer_id
            ))
            .expect("Failed to bulk insert badge classes");
        }

        let result = fixture
            .service
            .coordinator()
            .delete_issuer_cascade(&issuer_id)
            .await
            .expect("Cascade delete failed for a large issuer");
        assert!(result.issuer_deleted);
        assert_eq!(result.badge_classes_deleted, 40_002);
        assert_eq!(result.assertions_deleted, 3);
        assert_eq!(result.status_lists_deleted, 2);
        assert!(fixture
            .service
            .dal()
            .badge_class()
            .find_all_unbounded()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_issuer_without_dependents() {
        let fixture = initialized_fixture().await;
        let issuer = fixture
            .service
            .dal()
            .issuer()
            .create(sample_issuer("Lonely Academy"))
            .await
            .unwrap();

        let result = fixture
            .service
            .coordinator()
            .delete_issuer_cascade(&issuer.id)
            .await
            .unwrap();
        assert!(result.issuer_deleted);
        assert_eq!(result.badge_classes_deleted, 0);
        assert_eq!(result.assertions_deleted, 0);
        assert_eq!(result.status_lists_deleted, 0);
    }

    #[tokio::test]
    async fn test_missing_issuer_is_not_an_error() {
        let fixture = initialized_fixture().await;
        let result = fixture
            .service
            .coordinator()
            .delete_issuer_cascade(&generate_id())
            .await
            .expect("Deleting a missing issuer must succeed");
        assert_eq!(result, CascadeDeleteResult::default());
        assert!(!result.issuer_deleted);
    }

    #[tokio::test]
    async fn test_invalid_identifier_is_rejected() {
        let fixture = initialized_fixture().await;
        let err = fixture
            .service
            .coordinator()
            .delete_issuer_cascade("")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Validation(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_delete_rolls_back_everything() {
        let fixture = initialized_fixture().await;
        let issuer_id = populated_issuer(&fixture, "Protected University").await;

        {
            let mut raw = fixture.raw_connection();
            raw.batch_execute(
                "CREATE TRIGGER protect_issuers BEFORE DELETE ON issuers \
                 BEGIN SELECT RAISE(ABORT, 'issuers are protected'); END;",
            )
            .expect("Failed to install trigger");
        }

        let err = fixture
            .service
            .coordinator()
            .delete_issuer_cascade(&issuer_id)
            .await
            .unwrap_err();
        match &err {
            DatabaseError::TransactionAborted {
                steps_completed, ..
            } => {
                // the lookup and all three counts ran before the delete failed
                assert_eq!(*steps_completed, 4);
            }
            other => panic!("expected TransactionAborted, got {other:?}"),
        }
        assert!(err.to_string().contains("issuers are protected"), "{err}");

        let dal = fixture.service.dal();
        assert!(dal.issuer().find_by_id(&issuer_id).await.unwrap().is_some());
        assert_eq!(dal.badge_class().find_by_issuer(&issuer_id).await.unwrap().len(), 2);
        assert_eq!(dal.assertion().find_all_unbounded().await.unwrap().len(), 3);
        assert_eq!(
            dal.status_list().find_by_issuer(&issuer_id, None).await.unwrap().len(),
            2
        );

        // The connection is still usable after the rollback.
        assert!(fixture.service.manager().is_connected());
    }
}

mod ecosystem {
    use super::*;

    #[tokio::test]
    async fn test_creates_linked_entities() {
        let fixture = initialized_fixture().await;
        let result = fixture
            .service
            .coordinator()
            .create_ecosystem(
                sample_issuer("Ecosystem University"),
                // Placeholder foreign keys are replaced by the coordinator.
                sample_badge_class("urn:uuid:placeholder-ignored", "Founding Badge"),
                sample_assertion("urn:uuid:placeholder-ignored", "first@example.org"),
            )
            .await
            .expect("Failed to create ecosystem");

        assert_eq!(result.badge_class.issuer_id, result.issuer.id);
        assert_eq!(result.assertion.badge_class_id, result.badge_class.id);

        let dal = fixture.service.dal();
        assert_eq!(
            dal.issuer().find_by_id(&result.issuer.id).await.unwrap(),
            Some(result.issuer.clone())
        );
        assert_eq!(
            dal.assertion()
                .find_by_badge_class(&result.badge_class.id)
                .await
                .unwrap(),
            vec![result.assertion]
        );
    }

    #[tokio::test]
    async fn test_failure_in_last_step_leaves_nothing_behind() {
        let fixture = initialized_fixture().await;
        let dal = fixture.service.dal();
        let existing_issuer = dal.issuer().create(sample_issuer("Incumbent")).await.unwrap();
        let existing_badge = dal
            .badge_class()
            .create(sample_badge_class(&existing_issuer.id, "Incumbent Badge"))
            .await
            .unwrap();
        let existing = dal
            .assertion()
            .create(sample_assertion(&existing_badge.id, "taken@example.org"))
            .await
            .unwrap();

        let issuer_id = generate_id();
        let mut issuer = sample_issuer("Half Built");
        issuer.id = Some(issuer_id.clone());
        let badge_class_id = generate_id();
        let mut badge_class = sample_badge_class(&issuer_id, "Half Badge");
        badge_class.id = Some(badge_class_id.clone());
        let mut assertion = sample_assertion(&badge_class_id, "new@example.org");
        assertion.id = Some(existing.id.clone());

        let err = fixture
            .service
            .coordinator()
            .create_ecosystem(issuer, badge_class, assertion)
            .await
            .unwrap_err();
        match &err {
            DatabaseError::TransactionAborted {
                steps_completed, ..
            } => assert_eq!(*steps_completed, 2),
            other => panic!("expected TransactionAborted, got {other:?}"),
        }
        assert!(err.is_unique_violation(), "{err:?}");

        assert_eq!(dal.issuer().find_by_id(&issuer_id).await.unwrap(), None);
        assert_eq!(dal.badge_class().find_by_id(&badge_class_id).await.unwrap(), None);
        assert_eq!(dal.issuer().find_all_unbounded().await.unwrap().len(), 1);
        assert_eq!(
            dal.assertion().find_by_id(&existing.id).await.unwrap(),
            Some(existing)
        );
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_connecting() {
        let fixture = crate::fixtures::sqlite_fixture();
        let mut badge_class = sample_badge_class("urn:uuid:placeholder-ignored", "Nameless");
        badge_class.name = String::new();

        let err = fixture
            .service
            .coordinator()
            .create_ecosystem(
                sample_issuer("Validated"),
                badge_class,
                sample_assertion("urn:uuid:placeholder-ignored", "x@example.org"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
        assert_eq!(
            fixture.service.manager().state(),
            ConnectionState::Disconnected
        );
    }
}

mod connection_handling {
    use super::*;

    #[tokio::test]
    async fn test_reconnects_once_when_disconnected() {
        let fixture = initialized_fixture().await;
        fixture.service.manager().disconnect().await;
        assert!(!fixture.service.manager().is_connected());

        let result = fixture
            .service
            .coordinator()
            .create_ecosystem(
                sample_issuer("Woken Up"),
                sample_badge_class("urn:uuid:placeholder-ignored", "Alarm Badge"),
                sample_assertion("urn:uuid:placeholder-ignored", "early@example.org"),
            )
            .await
            .expect("Coordinator should connect implicitly");
        assert_eq!(result.issuer.name, "Woken Up");
        assert!(fixture.service.manager().is_connected());
    }

    #[tokio::test]
    async fn test_closed_manager_is_not_reopened() {
        let fixture = initialized_fixture().await;
        fixture.service.shutdown().await;

        let err = fixture
            .service
            .coordinator()
            .delete_issuer_cascade(&generate_id())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::ClosedConnection));
        assert_eq!(fixture.service.manager().state(), ConnectionState::Closed);
    }
}

mod health {
    use super::*;

    #[tokio::test]
    async fn test_healthy_when_connected() {
        let fixture = initialized_fixture().await;
        let health = fixture.service.health().await;

        assert!(health.healthy);
        assert!(health.connection.connected);
        assert_eq!(health.repositories.len(), EntityType::ALL.len());
        assert!(health.repositories.values().all(|ok| *ok));
    }

    #[tokio::test]
    async fn test_broken_repository_degrades_health() {
        let fixture = initialized_fixture().await;
        {
            let mut raw = fixture.raw_connection();
            raw.batch_execute("DROP TABLE user_assertions;")
                .expect("Failed to drop table");
        }

        let health = fixture.service.health().await;
        assert!(!health.healthy);
        assert!(health.connection.connected);
        assert!(!health.repositories[&EntityType::UserAssertion]);
        assert!(health.repositories[&EntityType::Issuer]);
        assert!(health.repositories[&EntityType::StatusList]);
    }

    #[tokio::test]
    async fn test_disconnected_health_does_not_fail() {
        let fixture = initialized_fixture().await;
        fixture.service.manager().disconnect().await;

        let health = fixture.service.health().await;
        assert!(!health.healthy);
        assert!(!health.connection.connected);
        assert_eq!(health.connection.state, ConnectionState::Disconnected);
        assert!(health.repositories.values().all(|ok| !*ok));
        // Health checks never connect on their own.
        assert_eq!(
            fixture.service.manager().state(),
            ConnectionState::Disconnected
        );
    }
}
