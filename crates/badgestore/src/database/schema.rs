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

//! Diesel table definitions, one module per backend.
//!
//! The two modules describe the same tables; they differ only in the native
//! column types (see [`universal_types`](crate::database::universal_types)).

pub mod sqlite {
    diesel::table! {
        issuers (id) {
            id -> Text,
            name -> Text,
            url -> Text,
            email -> Nullable<Text>,
            description -> Nullable<Text>,
            image -> Nullable<Text>,
            public_key -> Nullable<Text>,
            additional_fields -> Text,
            created_at -> BigInt,
            updated_at -> BigInt,
        }
    }

    diesel::table! {
        badge_classes (id) {
            id -> Text,
            issuer_id -> Text,
            name -> Text,
            description -> Text,
            image -> Nullable<Text>,
            criteria -> Text,
            alignment -> Nullable<Text>,
            tags -> Text,
            additional_fields -> Text,
            created_at -> BigInt,
            updated_at -> BigInt,
        }
    }

    diesel::table! {
        assertions (id) {
            id -> Text,
            badge_class_id -> Text,
            recipient -> Text,
            issued_on -> BigInt,
            expires -> Nullable<BigInt>,
            evidence -> Nullable<Text>,
            verification -> Nullable<Text>,
            revoked -> Integer,
            revocation_reason -> Nullable<Text>,
            additional_fields -> Text,
            created_at -> BigInt,
            updated_at -> BigInt,
        }
    }

    diesel::table! {
        platforms (id) {
            id -> Text,
            name -> Text,
            client_id -> Text,
            public_key -> Text,
            webhook_url -> Nullable<Text>,
            status -> Text,
            metadata -> Text,
            created_at -> BigInt,
            updated_at -> BigInt,
        }
    }

    diesel::table! {
        user_assertions (id) {
            id -> Text,
            user_id -> Text,
            assertion_id -> Text,
            status -> Text,
            metadata -> Text,
            added_at -> BigInt,
            updated_at -> BigInt,
        }
    }

    diesel::table! {
        status_lists (id) {
            id -> Text,
            issuer_id -> Text,
            purpose -> Text,
            status_size -> Integer,
            encoded_list -> Text,
            ttl_ms -> Nullable<BigInt>,
            total_entries -> Integer,
            used_entries -> Integer,
            metadata -> Text,
            created_at -> BigInt,
            updated_at -> BigInt,
        }
    }

    diesel::joinable!(badge_classes -> issuers (issuer_id));
    diesel::joinable!(assertions -> badge_classes (badge_class_id));
    diesel::joinable!(user_assertions -> assertions (assertion_id));
    diesel::joinable!(status_lists -> issuers (issuer_id));

    diesel::allow_tables_to_appear_in_same_query!(
        issuers,
        badge_classes,
        assertions,
        platforms,
        user_assertions,
        status_lists,
    );
}

pub mod postgres {
    diesel::table! {
        issuers (id) {
            id -> Text,
            name -> Text,
            url -> Text,
            email -> Nullable<Text>,
            description -> Nullable<Text>,
            image -> Nullable<Text>,
            public_key -> Nullable<Jsonb>,
            additional_fields -> Jsonb,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        badge_classes (id) {
            id -> Text,
            issuer_id -> Text,
            name -> Text,
            description -> Text,
            image -> Nullable<Text>,
            criteria -> Jsonb,
            alignment -> Nullable<Jsonb>,
            tags -> Jsonb,
            additional_fields -> Jsonb,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        assertions (id) {
            id -> Text,
            badge_class_id -> Text,
            recipient -> Jsonb,
            issued_on -> Timestamptz,
            expires -> Nullable<Timestamptz>,
            evidence -> Nullable<Jsonb>,
            verification -> Nullable<Jsonb>,
            revoked -> Bool,
            revocation_reason -> Nullable<Text>,
            additional_fields -> Jsonb,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        platforms (id) {
            id -> Text,
            name -> Text,
            client_id -> Text,
            public_key -> Text,
            webhook_url -> Nullable<Text>,
            status -> Text,
            metadata -> Jsonb,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        user_assertions (id) {
            id -> Text,
            user_id -> Text,
            assertion_id -> Text,
            status -> Text,
            metadata -> Jsonb,
            added_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::table! {
        status_lists (id) {
            id -> Text,
            issuer_id -> Text,
            purpose -> Text,
            status_size -> Int4,
            encoded_list -> Text,
            ttl_ms -> Nullable<Int8>,
            total_entries -> Int4,
            used_entries -> Int4,
            metadata -> Jsonb,
            created_at -> Timestamptz,
            updated_at -> Timestamptz,
        }
    }

    diesel::joinable!(badge_classes -> issuers (issuer_id));
    diesel::joinable!(assertions -> badge_classes (badge_class_id));
    diesel::joinable!(user_assertions -> assertions (assertion_id));
    diesel::joinable!(status_lists -> issuers (issuer_id));

    diesel::allow_tables_to_appear_in_same_query!(
        issuers,
        badge_classes,
        assertions,
        platforms,
        user_assertions,
        status_lists,
    );
}
