use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

table! {
    trainer_profiles (user_id) {
        user_id -> Text,
        display_name -> Text,
        capacity -> Integer,
        accepting_clients -> Bool,
        active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    client_profiles (user_id) {
        user_id -> Text,
        display_name -> Text,
        age -> Nullable<Integer>,
        goals -> Nullable<Text>,
        activity_level -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    assignments (id) {
        id -> BigInt,
        client_id -> Text,
        trainer_id -> Text,
        status -> Text,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        closed_at -> Nullable<Timestamptz>,
    }
}

table! {
    notifications (id) {
        id -> BigInt,
        user_id -> Text,
        notification_type -> Text,
        title -> Text,
        body -> Text,
        payload -> Jsonb,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

joinable!(assignments -> trainer_profiles (trainer_id));
joinable!(assignments -> client_profiles (client_id));

allow_tables_to_appear_in_same_query!(
    trainer_profiles,
    client_profiles,
    assignments,
    notifications,
);
