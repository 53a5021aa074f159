diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        username -> Varchar,
        first_name -> Varchar,
        last_name -> Varchar,
        password_hash -> Text,
        bio -> Text,
        avatar -> Nullable<Varchar>,
        location -> Varchar,
        website -> Varchar,
        is_verified -> Bool,
        is_active -> Bool,
        is_staff -> Bool,
        date_of_birth -> Nullable<Date>,
        email_notifications -> Bool,
        push_notifications -> Bool,
        last_login -> Nullable<Timestamptz>,
        date_joined -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    user_profiles (id) {
        id -> Uuid,
        user_id -> Uuid,
        organization -> Varchar,
        job_title -> Varchar,
        expertise_areas -> Jsonb,
        twitter_handle -> Varchar,
        linkedin_profile -> Varchar,
        profile_public -> Bool,
        show_email -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    categories (id) {
        id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        description -> Text,
        color -> Varchar,
        icon -> Varchar,
        parent_id -> Nullable<Uuid>,
        is_active -> Bool,
        sort_order -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    tags (id) {
        id -> Uuid,
        name -> Varchar,
        slug -> Varchar,
        description -> Text,
        color -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ideas (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
        summary -> Varchar,
        author_id -> Uuid,
        status -> Int2,
        priority -> Int2,
        location -> Varchar,
        scope -> Varchar,
        estimated_cost -> Nullable<Numeric>,
        estimated_timeline -> Varchar,
        implementation_plan -> Text,
        image -> Nullable<Varchar>,
        views_count -> Int4,
        votes_count -> Int4,
        comments_count -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        published_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    idea_categories (idea_id, category_id) {
        idea_id -> Uuid,
        category_id -> Uuid,
    }
}

diesel::table! {
    idea_tags (idea_id, tag_id) {
        idea_id -> Uuid,
        tag_id -> Uuid,
    }
}

diesel::table! {
    idea_attachments (id) {
        id -> Uuid,
        idea_id -> Uuid,
        file -> Varchar,
        title -> Varchar,
        description -> Text,
        attachment_type -> Int2,
        uploaded_by -> Uuid,
        uploaded_at -> Timestamptz,
    }
}

diesel::table! {
    idea_collaborators (id) {
        id -> Uuid,
        idea_id -> Uuid,
        user_id -> Uuid,
        role -> Int2,
        joined_at -> Timestamptz,
    }
}

diesel::table! {
    votes (id) {
        id -> Uuid,
        idea_id -> Uuid,
        user_id -> Uuid,
        vote_type -> Int2,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    comments (id) {
        id -> Uuid,
        idea_id -> Uuid,
        author_id -> Uuid,
        parent_id -> Nullable<Uuid>,
        content -> Text,
        is_public -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    idea_views (id) {
        id -> Uuid,
        idea_id -> Uuid,
        user_id -> Nullable<Uuid>,
        ip_address -> Nullable<Varchar>,
        user_agent -> Text,
        viewed_at -> Timestamptz,
    }
}

diesel::table! {
    notifications (id) {
        id -> Uuid,
        recipient_id -> Uuid,
        notification_type -> Int2,
        title -> Varchar,
        message -> Text,
        target_kind -> Nullable<Int2>,
        target_id -> Nullable<Uuid>,
        sender_id -> Nullable<Uuid>,
        is_read -> Bool,
        is_email_sent -> Bool,
        is_push_sent -> Bool,
        data -> Jsonb,
        created_at -> Timestamptz,
        read_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    notification_preferences (id) {
        id -> Uuid,
        user_id -> Uuid,
        email_notifications -> Bool,
        email_idea_updates -> Bool,
        email_comments -> Bool,
        email_votes -> Bool,
        email_collaboration -> Bool,
        email_system -> Bool,
        push_notifications -> Bool,
        push_idea_updates -> Bool,
        push_comments -> Bool,
        push_votes -> Bool,
        push_collaboration -> Bool,
        push_system -> Bool,
        digest_frequency -> Int2,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(user_profiles -> users (user_id));
diesel::joinable!(ideas -> users (author_id));
diesel::joinable!(idea_categories -> ideas (idea_id));
diesel::joinable!(idea_categories -> categories (category_id));
diesel::joinable!(idea_tags -> ideas (idea_id));
diesel::joinable!(idea_tags -> tags (tag_id));
diesel::joinable!(idea_attachments -> ideas (idea_id));
diesel::joinable!(idea_collaborators -> ideas (idea_id));
diesel::joinable!(idea_collaborators -> users (user_id));
diesel::joinable!(votes -> ideas (idea_id));
diesel::joinable!(votes -> users (user_id));
diesel::joinable!(comments -> ideas (idea_id));
diesel::joinable!(idea_views -> ideas (idea_id));
diesel::joinable!(notification_preferences -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    user_profiles,
    categories,
    tags,
    ideas,
    idea_categories,
    idea_tags,
    idea_attachments,
    idea_collaborators,
    votes,
    comments,
    idea_views,
    notifications,
    notification_preferences,
);
