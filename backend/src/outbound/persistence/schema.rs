//! Diesel table definitions for the pairing schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Single-use invite codes keyed by the code itself.
    pairing_tokens (code) {
        code -> Varchar,
        issuer_id -> Text,
        /// `role_a` or `role_b`.
        issuer_role -> Varchar,
        /// Always the complement of `issuer_role`.
        redeemer_role -> Varchar,
        /// `pending`, `used`, or `cancelled`.
        status -> Varchar,
        redeemed_by -> Nullable<Text>,
        created_at -> Timestamptz,
        redeemed_at -> Nullable<Timestamptz>,
        expires_at -> Nullable<Timestamptz>,
        cancelled_at -> Nullable<Timestamptz>,
        /// Optimistic concurrency counter; bumped by every committed write.
        revision -> Int4,
        /// Insertion order, breaking `created_at` ties in issuer listings.
        issue_seq -> Int8,
    }
}

diesel::table! {
    /// Connections between a RoleA account (`account_a_id`) and a RoleB
    /// account (`account_b_id`).
    connections (id) {
        id -> Uuid,
        account_a_id -> Text,
        account_b_id -> Text,
        created_by -> Text,
        status -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(pairing_tokens, connections);
